//! Transport capability abstraction
//!
//! A transport speaks the messaging network's protocol for one connection.
//! The runtime drives it through [`Transport`] and receives its lifecycle
//! events through the [`EventSink`] registered at initialization.

pub mod browser;

use crate::connection::{Event, InboundMessage, SessionInfo};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub use browser::{BrowserMode, BrowserOptions, BrowserTransportFactory};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to start transport: {0}")]
    Launch(String),

    #[error("{0}")]
    Operation(String),

    #[error("Session is not authorized: {0}")]
    Unauthorized(String),

    #[error("Not supported by this transport: {0}")]
    Unsupported(String),
}

/// Result of a successful send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
    /// Unix seconds
    pub timestamp: i64,
}

/// A file ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub mimetype: String,
    /// Base64 encoded file contents
    pub data: String,
    pub filename: Option<String>,
}

/// Typed subscription handed to a transport.
///
/// Events are queued in emission order onto the owning connection's event
/// loop. Emitting after the connection is gone is a silent no-op.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    async fn emit(&self, event: Event) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Event dropped, connection runtime stopped");
        }
    }

    pub async fn qr_issued(&self, payload: impl Into<String>) {
        self.emit(Event::QrIssued {
            payload: payload.into(),
        })
        .await;
    }

    pub async fn authenticated(&self) {
        self.emit(Event::Authenticated).await;
    }

    pub async fn ready(&self) {
        self.emit(Event::Ready).await;
    }

    pub async fn auth_failed(&self, reason: impl Into<String>) {
        self.emit(Event::AuthFailed {
            reason: reason.into(),
        })
        .await;
    }

    pub async fn disconnected(&self, reason: impl Into<String>) {
        self.emit(Event::Disconnected {
            reason: reason.into(),
        })
        .await;
    }

    pub async fn message_received(&self, message: InboundMessage) {
        self.emit(Event::MessageReceived(message)).await;
    }
}

/// One connection's link to the messaging network
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting. Progress is reported through `events`; an `Err`
    /// here means the connect sequence could not start at all.
    async fn initialize(&self, events: EventSink) -> Result<(), TransportError>;

    /// Account details for the authenticated session
    async fn session_info(&self) -> Result<SessionInfo, TransportError>;

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<SentMessage, TransportError>;

    async fn send_media(
        &self,
        chat_id: &str,
        media: &MediaPayload,
        caption: &str,
    ) -> Result<SentMessage, TransportError>;

    /// End the authenticated session
    async fn logout(&self) -> Result<(), TransportError>;

    /// Release every resource held by the transport
    async fn destroy(&self) -> Result<(), TransportError>;
}

/// Builds a fresh transport for a connection id
pub trait TransportFactory: Send + Sync {
    fn create(&self, connection_id: &str) -> Arc<dyn Transport>;
}
