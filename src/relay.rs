//! Inbound message relay
//!
//! Forwards inbound messages to an external decision endpoint and performs
//! the `send` actions it answers with on the originating connection.
//! Nothing in here ever fails the caller: every problem is logged and the
//! message is dropped.

mod client;
mod decision;

pub use client::{DecisionClient, DecisionRequest, HttpDecisionClient, RelayError};
pub use decision::parse_actions;

use crate::connection::InboundMessage;
use crate::error::ConnectionError;
use crate::runtime::Delivery;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    /// Only relay messages arriving on this connection
    pub pinned_connection: Option<String>,
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            pinned_connection: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// The outbound side of a connection, as used by the relay
#[async_trait]
pub trait ChatSender: Send + Sync {
    fn connection_id(&self) -> &str;

    async fn send_text(
        &self,
        receiver: &str,
        is_group: bool,
        body: &str,
    ) -> Result<Delivery, ConnectionError>;
}

/// What happened to one routed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Relay disabled, unconfigured, or pinned to another connection
    Skipped,
    /// The decision endpoint could not be used
    Aborted,
    /// The endpoint asked for nothing
    NoActions,
    Completed { sent: usize, failed: usize },
}

pub struct MessageRelay {
    config: RelayConfig,
    client: Arc<dyn DecisionClient>,
}

impl MessageRelay {
    pub fn new(config: RelayConfig, client: Arc<dyn DecisionClient>) -> Self {
        Self { config, client }
    }

    /// Relay backed by the HTTP decision client
    pub fn from_config(config: RelayConfig) -> Result<Self, RelayError> {
        let client = Arc::new(HttpDecisionClient::new(config.timeout)?);
        Ok(Self::new(config, client))
    }

    /// The endpoint to use for messages from `connection_id`, if any
    fn endpoint_for(&self, connection_id: &str) -> Option<&str> {
        if !self.config.enabled {
            return None;
        }
        let endpoint = self.config.endpoint.as_deref()?;
        match self.config.pinned_connection.as_deref() {
            Some(pinned) if pinned != connection_id => None,
            _ => Some(endpoint),
        }
    }

    pub fn should_forward(&self, connection_id: &str) -> bool {
        self.endpoint_for(connection_id).is_some()
    }

    pub async fn route(&self, sender: &dyn ChatSender, message: &InboundMessage) -> RouteOutcome {
        let connection_id = sender.connection_id();
        let Some(endpoint) = self.endpoint_for(connection_id) else {
            return RouteOutcome::Skipped;
        };

        tracing::info!(
            connection_id = %connection_id,
            from = %message.from,
            "Forwarding message to decision endpoint"
        );

        let request = DecisionRequest {
            connection_id: connection_id.to_string(),
            from_number: message.from.clone(),
            body: message.body.clone(),
            timestamp: message.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
            whatsapp_message_id: message.id.clone(),
        };

        let response = match self.client.decide(endpoint, &request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "Decision request failed");
                return RouteOutcome::Aborted;
            }
        };

        let Some(actions) = parse_actions(&response) else {
            tracing::debug!(connection_id = %connection_id, "Decision endpoint returned no actions");
            return RouteOutcome::NoActions;
        };

        let (mut sent, mut failed) = (0, 0);
        for action in actions {
            match sender.send_text(&action.to, action.is_group, &action.body).await {
                Ok(delivery) => {
                    sent += 1;
                    tracing::info!(
                        connection_id = %connection_id,
                        to = %delivery.chat_id,
                        message_id = %delivery.message.id,
                        "Relay reply sent"
                    );
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(
                        connection_id = %connection_id,
                        to = %action.to,
                        error = %e,
                        "Relay reply failed"
                    );
                }
            }
        }

        RouteOutcome::Completed { sent, failed }
    }
}
