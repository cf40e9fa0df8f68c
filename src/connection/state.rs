//! Connection record and status types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Initializing,
    QrReady,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Initializing => "initializing",
            ConnectionStatus::QrReady => "qr_ready",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }

    /// Disconnected and Error only change through restart or delete
    pub fn is_stable(self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Error)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account details reported by the transport once connected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(rename = "pushname")]
    pub display_name: Option<String>,
    #[serde(rename = "phone")]
    pub phone_number: String,
    pub platform: Option<String>,
}

/// One registry entry.
///
/// Serialized with the field names dashboards already consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    pub name: String,
    pub status: ConnectionStatus,
    #[serde(rename = "qrCode")]
    pub qr_payload: Option<String>,
    pub qr_image: Option<String>,
    #[serde(rename = "info")]
    pub session_info: Option<SessionInfo>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl ConnectionRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ConnectionStatus::Initializing,
            qr_payload: None,
            qr_image: None,
            session_info: None,
            last_error: None,
            created_at,
            connected_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub(crate) fn clear_qr(&mut self) {
        self.qr_payload = None;
        self.qr_image = None;
    }

    pub(crate) fn clear_session(&mut self) {
        self.session_info = None;
        self.connected_at = None;
    }
}
