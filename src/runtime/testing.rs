//! Mock implementations for testing
//!
//! These mocks enable runtime, registry and API tests without a browser or
//! a decision endpoint.

use super::{Connection, Delivery};
use crate::chat_target;
use crate::connection::{ConnectionRecord, SessionInfo};
use crate::error::ConnectionError;
use crate::relay::{ChatSender, DecisionClient, DecisionRequest, RelayError};
use crate::transport::{
    EventSink, MediaPayload, SentMessage, Transport, TransportError, TransportFactory,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll a connection until its record satisfies `predicate`
pub async fn wait_for(
    conn: &Connection,
    predicate: impl Fn(&ConnectionRecord) -> bool,
) -> ConnectionRecord {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        let record = conn.record();
        if predicate(&record) {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for connection record, last seen: {record:?}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

/// A send as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub chat_id: String,
    /// Text body, or the caption for media
    pub body: String,
    pub media: Option<MediaPayload>,
}

/// Transport driven entirely by the test through its [`EventSink`]
#[allow(dead_code)]
#[derive(Default)]
pub struct MockTransport {
    sink: Mutex<Option<EventSink>>,
    init_error: Mutex<Option<TransportError>>,
    session_info: Mutex<Option<SessionInfo>>,
    send_errors: Mutex<VecDeque<TransportError>>,
    logout_error: Mutex<Option<TransportError>>,
    destroy_error: Mutex<Option<TransportError>>,
    sent: Mutex<Vec<SentRecord>>,
    logout_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_initialize(&self, error: TransportError) {
        *self.init_error.lock().unwrap() = Some(error);
    }

    pub fn set_session_info(&self, info: SessionInfo) {
        *self.session_info.lock().unwrap() = Some(info);
    }

    pub fn fail_next_send(&self, error: TransportError) {
        self.send_errors.lock().unwrap().push_back(error);
    }

    pub fn fail_logout(&self, error: TransportError) {
        *self.logout_error.lock().unwrap() = Some(error);
    }

    pub fn fail_destroy(&self, error: TransportError) {
        *self.destroy_error.lock().unwrap() = Some(error);
    }

    /// The sink registered by `initialize`, once the runtime has called it
    pub async fn sink(&self) -> EventSink {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            if let Some(sink) = self.sink.lock().unwrap().clone() {
                return sink;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "transport was never initialized"
            );
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` sends were recorded
    pub async fn wait_for_sends(&self, count: usize) -> Vec<SentRecord> {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {count} sends, saw {}",
                sent.len()
            );
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    fn record_send(
        &self,
        chat_id: &str,
        body: &str,
        media: Option<MediaPayload>,
    ) -> Result<SentMessage, TransportError> {
        if let Some(error) = self.send_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentRecord {
            chat_id: chat_id.to_string(),
            body: body.to_string(),
            media,
        });
        Ok(SentMessage {
            id: format!("true_{chat_id}_{}", sent.len()),
            timestamp: 1_700_000_000,
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn initialize(&self, events: EventSink) -> Result<(), TransportError> {
        *self.sink.lock().unwrap() = Some(events);
        match self.init_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn session_info(&self) -> Result<SessionInfo, TransportError> {
        self.session_info
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::Operation("no session info scripted".to_string()))
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<SentMessage, TransportError> {
        self.record_send(chat_id, body, None)
    }

    async fn send_media(
        &self,
        chat_id: &str,
        media: &MediaPayload,
        caption: &str,
    ) -> Result<SentMessage, TransportError> {
        self.record_send(chat_id, caption, Some(media.clone()))
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        match self.logout_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        match self.destroy_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Mock Transport Factory
// ============================================================================

/// Hands out a fresh [`MockTransport`] per create and remembers them all
#[allow(dead_code)]
#[derive(Default)]
pub struct MockTransportFactory {
    created: Mutex<Vec<(String, Arc<MockTransport>)>>,
    failing_destroy: Mutex<HashSet<String>>,
}

#[allow(dead_code)]
impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports created for `connection_id` from now on fail to destroy
    pub fn fail_destroy_for(&self, connection_id: &str) {
        self.failing_destroy
            .lock()
            .unwrap()
            .insert(connection_id.to_string());
    }

    /// Most recent transport created for `connection_id`
    pub fn latest(&self, connection_id: &str) -> Arc<MockTransport> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == connection_id)
            .map(|(_, t)| t.clone())
            .unwrap_or_else(|| panic!("no transport created for {connection_id}"))
    }

    pub fn created_count(&self, connection_id: &str) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == connection_id)
            .count()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, connection_id: &str) -> Arc<dyn Transport> {
        let transport = Arc::new(MockTransport::new());
        if self.failing_destroy.lock().unwrap().contains(connection_id) {
            transport.fail_destroy(TransportError::Operation("browser hung".to_string()));
        }
        self.created
            .lock()
            .unwrap()
            .push((connection_id.to_string(), transport.clone()));
        transport
    }
}

// ============================================================================
// Mock Decision Client
// ============================================================================

/// Decision client that returns queued responses
#[allow(dead_code)]
#[derive(Default)]
pub struct MockDecisionClient {
    responses: Mutex<VecDeque<Result<Value, RelayError>>>,
    /// Every (endpoint, request) pair received
    requests: Mutex<Vec<(String, DecisionRequest)>>,
    /// When set, each call waits for one `release` before answering
    gate: Mutex<Option<Arc<Notify>>>,
    panic_next: AtomicBool,
}

#[allow(dead_code)]
impl MockDecisionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_response(&self, response: Value) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: RelayError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<(String, DecisionRequest)> {
        self.requests.lock().unwrap().clone()
    }

    /// Make calls block until [`Self::release`]
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    /// Let one held call answer
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.notify_one();
        }
    }

    /// The next call panics instead of answering
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    /// Wait until at least `count` calls have arrived
    pub async fn wait_for_requests(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        while self.requests.lock().unwrap().len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {count} decision requests"
            );
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl DecisionClient for MockDecisionClient {
    async fn decide(&self, endpoint: &str, request: &DecisionRequest) -> Result<Value, RelayError> {
        self.requests
            .lock()
            .unwrap()
            .push((endpoint.to_string(), request.clone()));

        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("decision client blew up");
        }
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RelayError::Request("no response queued".to_string())))
    }
}

// ============================================================================
// Mock Chat Sender
// ============================================================================

/// Always-connected sender that records normalized sends
#[allow(dead_code)]
pub struct MockChatSender {
    connection_id: String,
    errors: Mutex<VecDeque<ConnectionError>>,
    sent: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl MockChatSender {
    pub fn new(connection_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            errors: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, error: ConnectionError) {
        self.errors.lock().unwrap().push_back(error);
    }

    /// Recorded (chat id, body) pairs
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSender for MockChatSender {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn send_text(
        &self,
        receiver: &str,
        is_group: bool,
        body: &str,
    ) -> Result<Delivery, ConnectionError> {
        if let Some(error) = self.errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let chat_id = chat_target::normalize(receiver, is_group);
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.clone(), body.to_string()));
        Ok(Delivery {
            chat_id,
            message: SentMessage {
                id: "mock-reply".to_string(),
                timestamp: 1_700_000_000,
            },
        })
    }
}
