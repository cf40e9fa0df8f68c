//! API request and response types
//!
//! Field names follow the wire format existing dashboards already speak.

use crate::connection::{ConnectionRecord, ConnectionStatus};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================
// Requests
// ============================================================

/// Request to create a connection
#[derive(Debug, Default, Deserialize)]
pub struct CreateConnectionRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

/// Request to send a text message
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub connection_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub receiver: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_group: bool,
}

/// Request to send a file fetched from a URL
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFileRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub connection_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub receiver: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub file_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub caption: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_group: bool,
}

/// Accept strings or numbers; empty strings and nulls count as absent
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Truthiness as loosely typed clients send it: null, `false`, `0`, `""`,
/// `"false"` and `"0"` are false, anything else is true
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !matches!(s.trim(), "" | "0" | "false"),
        Value::Array(_) | Value::Object(_) => true,
    })
}

// ============================================================
// Responses
// ============================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub server_version: &'static str,
    pub total_connections: usize,
    pub connections: Vec<ConnectionSummary>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub name: String,
    pub status: ConnectionStatus,
}

impl From<&ConnectionRecord> for ConnectionSummary {
    fn from(record: &ConnectionRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            status: record.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateConnectionResponse {
    pub success: bool,
    pub message: &'static str,
    pub connection: ConnectionRecord,
}

#[derive(Debug, Serialize)]
pub struct ConnectionListResponse {
    pub success: bool,
    pub total: usize,
    pub connections: Vec<ConnectionRecord>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub success: bool,
    pub connection: ConnectionRecord,
}

/// QR lookup result. Not having a QR to show is not an HTTP error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QrResponse {
    Available {
        success: bool,
        qr: String,
        qr_image: Option<String>,
        status: ConnectionStatus,
    },
    Unavailable {
        success: bool,
        error: &'static str,
        status: ConnectionStatus,
    },
}

impl QrResponse {
    pub fn for_record(record: &ConnectionRecord) -> Self {
        if record.status == ConnectionStatus::Connected {
            return QrResponse::Unavailable {
                success: false,
                error: "Already authenticated",
                status: record.status,
            };
        }
        match &record.qr_payload {
            Some(qr) => QrResponse::Available {
                success: true,
                qr: qr.clone(),
                qr_image: record.qr_image.clone(),
                status: record.status,
            },
            None => QrResponse::Unavailable {
                success: false,
                error: "QR code not available yet",
                status: record.status,
            },
        }
    }
}

/// Acknowledgement with a human readable message
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

impl MessageResponse {
    pub fn new(message: &'static str) -> Self {
        Self {
            success: true,
            message,
        }
    }
}

/// Result of a text or file send
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub message_id: String,
    pub timestamp: i64,
    pub to: String,
    /// Display name of the connection used
    pub connection: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn send_request_accepts_numeric_receiver() {
        let req: SendTextRequest = serde_json::from_value(json!({
            "receiver": 15551234567u64,
            "message": "hi",
            "isGroup": false
        }))
        .unwrap();
        assert_eq!(req.receiver.as_deref(), Some("15551234567"));
        assert!(req.connection_id.is_none());
    }

    #[test]
    fn is_group_accepts_loose_values() {
        let is_group = |value: Value| {
            serde_json::from_value::<SendTextRequest>(json!({
                "receiver": "team",
                "message": "hi",
                "isGroup": value
            }))
            .unwrap()
            .is_group
        };

        let falsy_values = [
            json!(null),
            json!(false),
            json!(0),
            json!(""),
            json!("false"),
            json!("0"),
        ];
        for falsy in falsy_values {
            assert!(!is_group(falsy.clone()), "{falsy} should mean an individual chat");
        }
        for truthy in [json!(true), json!(1), json!("true"), json!("yes")] {
            assert!(is_group(truthy.clone()), "{truthy} should mean a group");
        }

        let req: SendFileRequest =
            serde_json::from_value(json!({"receiver": "team", "fileUrl": "http://x/a.png"}))
                .unwrap();
        assert!(!req.is_group);
        let req: SendFileRequest =
            serde_json::from_value(json!({"receiver": "team", "isGroup": "true"})).unwrap();
        assert!(req.is_group);
    }

    #[test]
    fn empty_strings_are_missing() {
        let req: CreateConnectionRequest =
            serde_json::from_value(json!({"id": "", "name": null})).unwrap();
        assert!(req.id.is_none());
        assert!(req.name.is_none());
    }

    #[test]
    fn qr_response_shapes() {
        let mut record = ConnectionRecord::new("sales", "Sales", Utc::now());
        assert_eq!(
            serde_json::to_value(QrResponse::for_record(&record)).unwrap(),
            json!({"success": false, "error": "QR code not available yet", "status": "initializing"})
        );

        record.status = ConnectionStatus::QrReady;
        record.qr_payload = Some("2@xyz".to_string());
        assert_eq!(
            serde_json::to_value(QrResponse::for_record(&record)).unwrap(),
            json!({"success": true, "qr": "2@xyz", "qr_image": null, "status": "qr_ready"})
        );

        record.status = ConnectionStatus::Connected;
        record.qr_payload = None;
        assert_eq!(
            serde_json::to_value(QrResponse::for_record(&record)).unwrap(),
            json!({"success": false, "error": "Already authenticated", "status": "connected"})
        );
    }
}
