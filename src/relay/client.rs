//! HTTP client for the decision endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Payload POSTed to the decision endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionRequest {
    pub connection_id: String,
    pub from_number: String,
    pub body: String,
    /// Unix seconds
    pub timestamp: i64,
    pub whatsapp_message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
    #[error("Decision endpoint request failed: {0}")]
    Request(String),
    #[error("Decision endpoint returned HTTP {0}")]
    Status(u16),
    #[error("Decision endpoint returned invalid JSON: {0}")]
    InvalidJson(String),
}

/// Asks the external decision service what to do with a message
#[async_trait]
pub trait DecisionClient: Send + Sync {
    async fn decide(&self, endpoint: &str, request: &DecisionRequest) -> Result<Value, RelayError>;
}

pub struct HttpDecisionClient {
    client: Client,
}

impl HttpDecisionClient {
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DecisionClient for HttpDecisionClient {
    async fn decide(&self, endpoint: &str, request: &DecisionRequest) -> Result<Value, RelayError> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Request(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    RelayError::Request(format!("Connection failed: {e}"))
                } else {
                    RelayError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Request(format!("Failed to read response: {e}")))?;

        serde_json::from_str(&body).map_err(|e| RelayError::InvalidJson(e.to_string()))
    }
}
