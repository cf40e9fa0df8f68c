//! Connection handle

use super::executor::{apply_event, relay_worker, ConnectionRuntime};
use super::Delivery;
use crate::chat_target;
use crate::connection::{ConnectionRecord, ConnectionStatus, Event};
use crate::error::ConnectionError;
use crate::relay::{ChatSender, MessageRelay};
use crate::transport::{MediaPayload, Transport};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const EVENT_BUFFER: usize = 128;
const RELAY_QUEUE: usize = 256;

/// Sending side of a connection.
///
/// Shared between the API and the relay worker. Every send checks the live
/// status first and normalizes the receiver before reaching the transport.
pub struct Outbound {
    connection_id: String,
    record: watch::Receiver<ConnectionRecord>,
    transport: Arc<dyn Transport>,
}

impl Outbound {
    fn ensure_connected(&self) -> Result<(), ConnectionError> {
        let status = self.record.borrow().status;
        if status == ConnectionStatus::Connected {
            Ok(())
        } else {
            Err(ConnectionError::NotReady {
                id: self.connection_id.clone(),
                status,
            })
        }
    }

    pub async fn send_text(
        &self,
        receiver: &str,
        is_group: bool,
        body: &str,
    ) -> Result<Delivery, ConnectionError> {
        self.ensure_connected()?;
        let chat_id = chat_target::normalize(receiver, is_group);
        let message = self.transport.send_text(&chat_id, body).await?;
        Ok(Delivery { chat_id, message })
    }

    pub async fn send_media(
        &self,
        receiver: &str,
        is_group: bool,
        media: &MediaPayload,
        caption: &str,
    ) -> Result<Delivery, ConnectionError> {
        self.ensure_connected()?;
        let chat_id = chat_target::normalize(receiver, is_group);
        let message = self.transport.send_media(&chat_id, media, caption).await?;
        Ok(Delivery { chat_id, message })
    }
}

#[async_trait]
impl ChatSender for Outbound {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn send_text(
        &self,
        receiver: &str,
        is_group: bool,
        body: &str,
    ) -> Result<Delivery, ConnectionError> {
        Outbound::send_text(self, receiver, is_group, body).await
    }
}

/// A live connection: its record, its transport and the tasks driving them
pub struct Connection {
    seq: u64,
    record: Arc<watch::Sender<ConnectionRecord>>,
    outbound: Arc<Outbound>,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

impl Connection {
    /// Register an `Initializing` record and start connecting in the background
    pub fn spawn(
        id: &str,
        name: &str,
        seq: u64,
        transport: Arc<dyn Transport>,
        relay: Arc<MessageRelay>,
    ) -> Self {
        let (record_tx, record_rx) = watch::channel(ConnectionRecord::new(id, name, Utc::now()));
        let record = Arc::new(record_tx);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (relay_tx, relay_rx) = mpsc::channel(RELAY_QUEUE);
        let cancel = CancellationToken::new();

        let outbound = Arc::new(Outbound {
            connection_id: id.to_string(),
            record: record_rx,
            transport: transport.clone(),
        });

        tokio::spawn(relay_worker(relay.clone(), outbound.clone(), relay_rx));

        let runtime = ConnectionRuntime::new(
            id.to_string(),
            record.clone(),
            transport.clone(),
            relay,
            event_rx,
            event_tx,
            relay_tx,
            cancel.clone(),
        );
        tokio::spawn(runtime.run());

        Self {
            seq,
            record,
            outbound,
            transport,
            cancel,
        }
    }

    pub fn id(&self) -> String {
        self.record.borrow().id.clone()
    }

    /// Creation order within the registry
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Snapshot of the current record
    pub fn record(&self) -> ConnectionRecord {
        self.record.borrow().clone()
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// End the session. Succeeds in any state and leaves the record
    /// `Disconnected`; a transport failure changes nothing.
    pub async fn logout(&self) -> Result<(), ConnectionError> {
        self.transport
            .logout()
            .await
            .map_err(|e| ConnectionError::OperationFailed(format!("Failed to logout: {e}")))?;

        if let Err(e) = apply_event(&self.record, Event::LoggedOut) {
            tracing::warn!(connection_id = %self.id(), error = %e, "Logout transition rejected");
        }
        tracing::info!(connection_id = %self.id(), "Logged out");
        Ok(())
    }

    /// Release the transport, then stop the event loop
    pub async fn destroy(&self) -> Result<(), ConnectionError> {
        self.transport.destroy().await.map_err(|e| {
            ConnectionError::OperationFailed(format!("Failed to destroy connection: {e}"))
        })?;
        self.cancel.cancel();
        Ok(())
    }
}
