//! Error taxonomy for connection operations

use crate::connection::ConnectionStatus;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors surfaced synchronously by registry and connection operations.
///
/// Asynchronous transport failures (connect, auth) never show up here; they
/// land in the record's `status` and `last_error` instead.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection already exists")]
    AlreadyExists(String),

    #[error("Connection not found")]
    NotFound(String),

    #[error("Connection {id} is not ready. Current status: {status}")]
    NotReady { id: String, status: ConnectionStatus },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    OperationFailed(String),

    #[error("Authentication failed: {0}")]
    AuthFailure(String),
}

impl From<TransportError> for ConnectionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Unauthorized(reason) => ConnectionError::AuthFailure(reason),
            other => ConnectionError::OperationFailed(other.to_string()),
        }
    }
}
