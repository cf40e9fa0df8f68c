//! Connection registry
//!
//! The single owner of every live connection, keyed by caller-chosen id.

use crate::connection::ConnectionRecord;
use crate::error::ConnectionError;
use crate::relay::MessageRelay;
use crate::runtime::Connection;
use crate::transport::TransportFactory;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Pause between tearing a connection down and re-creating it on restart.
/// Transport teardown gives no completion signal, so this is a heuristic.
pub const RESTART_SETTLE_DELAY: Duration = Duration::from_secs(2);

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    next_seq: AtomicU64,
    factory: Arc<dyn TransportFactory>,
    relay: Arc<MessageRelay>,
    settle_delay: Duration,
}

impl ConnectionRegistry {
    pub fn new(factory: Arc<dyn TransportFactory>, relay: Arc<MessageRelay>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            factory,
            relay,
            settle_delay: RESTART_SETTLE_DELAY,
        }
    }

    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Register a new connection and start connecting it.
    ///
    /// The returned record is always `Initializing`; connect progress and
    /// failures show up in later snapshots.
    pub async fn create(&self, id: &str, name: &str) -> Result<ConnectionRecord, ConnectionError> {
        let mut connections = self.connections.write().await;
        if connections.contains_key(id) {
            return Err(ConnectionError::AlreadyExists(id.to_string()));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let transport = self.factory.create(id);
        let connection = Arc::new(Connection::spawn(id, name, seq, transport, self.relay.clone()));
        let record = connection.record();
        connections.insert(id.to_string(), connection);

        tracing::info!(connection_id = %id, name = %name, "Connection created");
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Arc<Connection>, ConnectionError> {
        self.connections
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound(id.to_string()))
    }

    /// Every live connection in creation order
    pub async fn list(&self) -> Vec<Arc<Connection>> {
        let mut connections: Vec<_> = self.connections.read().await.values().cloned().collect();
        connections.sort_by_key(|c| c.seq());
        connections
    }

    pub async fn records(&self) -> Vec<ConnectionRecord> {
        self.list().await.iter().map(|c| c.record()).collect()
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Destroy a connection, then forget it.
    ///
    /// A failed destroy leaves the entry in place so the delete can be retried.
    pub async fn delete(&self, id: &str) -> Result<(), ConnectionError> {
        let connection = self.get(id).await?;
        connection.destroy().await?;

        let mut connections = self.connections.write().await;
        if connections
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, &connection))
        {
            connections.remove(id);
        }

        tracing::info!(connection_id = %id, "Connection deleted");
        Ok(())
    }

    /// Delete a connection now and re-create it under the same id and name
    /// once the settle delay has passed.
    pub async fn restart(self: &Arc<Self>, id: &str) -> Result<(), ConnectionError> {
        let name = self.get(id).await?.record().name;
        self.delete(id).await?;

        tracing::info!(connection_id = %id, delay = ?self.settle_delay, "Connection restarting");

        let registry = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(registry.settle_delay).await;
            if let Err(e) = registry.create(&id, &name).await {
                tracing::warn!(
                    connection_id = %id,
                    error = %e,
                    "Failed to re-create connection after restart"
                );
            }
        });

        Ok(())
    }

    /// Destroy every connection, collecting failures instead of stopping at
    /// the first one.
    pub async fn shutdown_all(&self) -> Vec<(String, ConnectionError)> {
        let connections: Vec<_> = self.connections.write().await.drain().collect();

        let results = join_all(
            connections
                .into_iter()
                .map(|(id, conn)| async move { (id, conn.destroy().await) }),
        )
        .await;

        results
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|e| (id, e)))
            .collect()
    }
}
