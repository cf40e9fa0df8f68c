//! Pure state transition function

use super::{ConnectionRecord, ConnectionStatus, Effect, Event};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub record: ConnectionRecord,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(record: ConnectionRecord) -> Self {
        Self {
            record,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Events that do not apply to the current status
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("QR code received while {0}")]
    UnexpectedQr(ConnectionStatus),
    #[error("Disconnect ignored while {0}")]
    DisconnectIgnored(ConnectionStatus),
    #[error("Stale {0} event dropped")]
    Stale(&'static str),
}

/// Pure transition function.
///
/// Given the same record, event and clock reading it always produces the
/// same result and performs no I/O.
pub fn transition(
    record: &ConnectionRecord,
    event: Event,
    now: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    let mut next = record.clone();

    match event {
        Event::QrIssued { payload } => match record.status {
            ConnectionStatus::Initializing | ConnectionStatus::QrReady => {
                next.status = ConnectionStatus::QrReady;
                // Latest payload wins; any image belongs to the old one
                next.qr_payload = Some(payload.clone());
                next.qr_image = None;
                Ok(TransitionResult::new(next).with_effect(Effect::RenderQr { payload }))
            }
            other => Err(TransitionError::UnexpectedQr(other)),
        },

        Event::Ready => {
            next.status = ConnectionStatus::Connected;
            next.clear_qr();
            next.connected_at = Some(now);
            Ok(TransitionResult::new(next).with_effect(Effect::FetchSessionInfo))
        }

        Event::Authenticated => Ok(TransitionResult::new(next)),

        Event::AuthFailed { reason } => {
            enter_error(&mut next, reason);
            Ok(TransitionResult::new(next))
        }

        Event::InitFailed { error } => {
            enter_error(&mut next, error);
            Ok(TransitionResult::new(next))
        }

        Event::Disconnected { .. } => {
            if record.status == ConnectionStatus::Error {
                return Err(TransitionError::DisconnectIgnored(record.status));
            }
            next.status = ConnectionStatus::Disconnected;
            next.clear_qr();
            next.clear_session();
            Ok(TransitionResult::new(next))
        }

        Event::LoggedOut => {
            next.status = ConnectionStatus::Disconnected;
            next.clear_qr();
            next.clear_session();
            Ok(TransitionResult::new(next))
        }

        Event::MessageReceived(message) => {
            Ok(TransitionResult::new(next).with_effect(Effect::RouteMessage(message)))
        }

        Event::QrRendered { payload, image } => {
            let current = record.status == ConnectionStatus::QrReady
                && record.qr_payload.as_deref() == Some(payload.as_str());
            if !current {
                return Err(TransitionError::Stale("qr_rendered"));
            }
            next.qr_image = Some(image);
            Ok(TransitionResult::new(next))
        }

        Event::SessionInfoLoaded(info) => {
            if !record.is_connected() {
                return Err(TransitionError::Stale("session_info_loaded"));
            }
            next.session_info = Some(info);
            Ok(TransitionResult::new(next))
        }
    }
}

fn enter_error(record: &mut ConnectionRecord, reason: String) {
    record.status = ConnectionStatus::Error;
    record.clear_qr();
    record.clear_session();
    record.last_error = Some(reason);
}
