//! Events that drive a connection

use super::state::SessionInfo;
use serde::{Deserialize, Serialize};

/// A message received from the messaging network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
    /// Unix seconds as reported by the network
    pub timestamp: Option<i64>,
    /// Network-level message identifier
    pub id: Option<String>,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Transport events
    QrIssued { payload: String },
    Authenticated,
    Ready,
    AuthFailed { reason: String },
    Disconnected { reason: String },
    MessageReceived(InboundMessage),

    // Runtime events
    InitFailed { error: String },
    QrRendered { payload: String, image: String },
    SessionInfoLoaded(SessionInfo),
    LoggedOut,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::QrIssued { .. } => "qr_issued",
            Event::Authenticated => "authenticated",
            Event::Ready => "ready",
            Event::AuthFailed { .. } => "auth_failed",
            Event::Disconnected { .. } => "disconnected",
            Event::MessageReceived(_) => "message_received",
            Event::InitFailed { .. } => "init_failed",
            Event::QrRendered { .. } => "qr_rendered",
            Event::SessionInfoLoaded(_) => "session_info_loaded",
            Event::LoggedOut => "logged_out",
        }
    }
}
