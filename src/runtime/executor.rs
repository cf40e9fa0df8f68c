//! Connection event loop and relay worker

use crate::connection::{
    transition, ConnectionRecord, Effect, Event, InboundMessage, TransitionError,
};
use crate::qr;
use crate::relay::{ChatSender, MessageRelay};
use crate::transport::{EventSink, Transport};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Apply one event to the record under the watch lock.
///
/// Returns the effects to execute. Subscribers are only notified when the
/// record actually changed.
pub(super) fn apply_event(
    record: &watch::Sender<ConnectionRecord>,
    event: Event,
) -> Result<Vec<Effect>, TransitionError> {
    let mut outcome = Ok(Vec::new());

    record.send_if_modified(|current| match transition(current, event, Utc::now()) {
        Ok(result) => {
            if result.record.status != current.status {
                tracing::info!(
                    connection_id = %current.id,
                    from = %current.status,
                    to = %result.record.status,
                    "Connection status changed"
                );
                if result.record.status.is_stable() {
                    tracing::warn!(
                        connection_id = %current.id,
                        last_error = ?result.record.last_error,
                        "Connection stopped; restart or delete it to recover"
                    );
                }
            }
            let changed = result.record != *current;
            *current = result.record;
            outcome = Ok(result.effects);
            changed
        }
        Err(e) => {
            outcome = Err(e);
            false
        }
    });

    outcome
}

pub(super) struct ConnectionRuntime {
    connection_id: String,
    record: Arc<watch::Sender<ConnectionRecord>>,
    transport: Arc<dyn Transport>,
    relay: Arc<MessageRelay>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    relay_tx: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
}

impl ConnectionRuntime {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        connection_id: String,
        record: Arc<watch::Sender<ConnectionRecord>>,
        transport: Arc<dyn Transport>,
        relay: Arc<MessageRelay>,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        relay_tx: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connection_id,
            record,
            transport,
            relay,
            event_rx,
            event_tx,
            relay_tx,
            cancel,
        }
    }

    pub(super) async fn run(mut self) {
        tracing::info!(connection_id = %self.connection_id, "Starting connection runtime");

        self.start_transport();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        tracing::info!(connection_id = %self.connection_id, "Connection runtime stopped");
    }

    /// Kick off the connect sequence without blocking the loop
    fn start_transport(&self) {
        let transport = self.transport.clone();
        let sink = EventSink::new(self.event_tx.clone());
        let event_tx = self.event_tx.clone();
        let connection_id = self.connection_id.clone();

        tokio::spawn(async move {
            if let Err(e) = transport.initialize(sink).await {
                tracing::error!(connection_id = %connection_id, error = %e, "Failed to initialize transport");
                let _ = event_tx
                    .send(Event::InitFailed {
                        error: e.to_string(),
                    })
                    .await;
            }
        });
    }

    fn handle_event(&self, event: Event) {
        let kind = event.kind();
        tracing::debug!(connection_id = %self.connection_id, event = kind, "Handling event");

        match apply_event(&self.record, event) {
            Ok(effects) => {
                for effect in effects {
                    self.execute_effect(effect);
                }
            }
            Err(e @ TransitionError::Stale(_)) => {
                tracing::debug!(connection_id = %self.connection_id, error = %e, "Event dropped");
            }
            Err(e) => {
                tracing::warn!(connection_id = %self.connection_id, event = kind, error = %e, "Event rejected");
            }
        }
    }

    fn execute_effect(&self, effect: Effect) {
        match effect {
            Effect::RenderQr { payload } => {
                let event_tx = self.event_tx.clone();
                let connection_id = self.connection_id.clone();
                tokio::spawn(async move {
                    let input = payload.clone();
                    match tokio::task::spawn_blocking(move || qr::render_data_url(&input)).await {
                        Ok(Ok(image)) => {
                            let _ = event_tx.send(Event::QrRendered { payload, image }).await;
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(connection_id = %connection_id, error = %e, "QR rendering failed");
                        }
                        Err(e) => {
                            tracing::warn!(connection_id = %connection_id, error = %e, "QR rendering task failed");
                        }
                    }
                });
            }

            Effect::FetchSessionInfo => {
                let transport = self.transport.clone();
                let event_tx = self.event_tx.clone();
                let connection_id = self.connection_id.clone();
                tokio::spawn(async move {
                    match transport.session_info().await {
                        Ok(info) => {
                            tracing::info!(
                                connection_id = %connection_id,
                                phone = %info.phone_number,
                                "Session ready"
                            );
                            let _ = event_tx.send(Event::SessionInfoLoaded(info)).await;
                        }
                        Err(e) => {
                            tracing::warn!(connection_id = %connection_id, error = %e, "Failed to load session info");
                        }
                    }
                });
            }

            Effect::RouteMessage(message) => {
                if !self.relay.should_forward(&self.connection_id) {
                    return;
                }
                match self.relay_tx.try_send(message) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(message)) => {
                        tracing::warn!(
                            connection_id = %self.connection_id,
                            from = %message.from,
                            "Relay queue full, message dropped"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!(connection_id = %self.connection_id, "Relay worker stopped");
                    }
                }
            }
        }
    }
}

/// Route queued inbound messages one at a time, in arrival order
pub(super) async fn relay_worker(
    relay: Arc<MessageRelay>,
    sender: Arc<dyn ChatSender>,
    mut rx: mpsc::Receiver<InboundMessage>,
) {
    while let Some(message) = rx.recv().await {
        let routed = AssertUnwindSafe(relay.route(sender.as_ref(), &message))
            .catch_unwind()
            .await;
        match routed {
            Ok(outcome) => {
                tracing::debug!(connection_id = %sender.connection_id(), ?outcome, "Message routed");
            }
            Err(_) => {
                tracing::error!(
                    connection_id = %sender.connection_id(),
                    from = %message.from,
                    "Relay panicked while routing message"
                );
            }
        }
    }
}
