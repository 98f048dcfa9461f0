//! Stream registry implementation
//!
//! The central table of live sessions across all transports.

use std::collections::HashMap;

use tokio::sync::{watch, RwLock};

use super::entry::{StreamEntry, Transport};
use super::error::RegistryError;
use crate::stats::ServerStats;

struct Inner {
    streams: HashMap<u64, StreamEntry>,
    next_id: u64,
    closed: bool,
    stats: ServerStats,
}

/// Central registry of live streaming sessions
///
/// Every mutation happens under a single write lock, and the resulting
/// counts are published on a `watch` channel so readers never contend
/// with connecting sessions.
pub struct StreamRegistry {
    inner: RwLock<Inner>,
    stats_tx: watch::Sender<ServerStats>,
}

impl StreamRegistry {
    /// Create an empty, open registry
    pub fn new() -> Self {
        let (stats_tx, _) = watch::channel(ServerStats::default());

        Self {
            inner: RwLock::new(Inner {
                streams: HashMap::new(),
                next_id: 1,
                closed: false,
                stats: ServerStats::default(),
            }),
            stats_tx,
        }
    }

    /// Register a new session
    ///
    /// Returns the session's id, or `RegistryError::Closed` once the
    /// registry has been closed for shutdown.
    pub async fn connect(
        &self,
        transport: Transport,
        remote_addr: impl Into<String>,
    ) -> Result<u64, RegistryError> {
        let mut inner = self.inner.write().await;

        if inner.closed {
            return Err(RegistryError::Closed);
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let entry = StreamEntry::new(id, transport, remote_addr.into());
        tracing::debug!(
            session_id = id,
            transport = %transport,
            remote_ip = %entry.remote_addr,
            "Stream connected"
        );
        inner.streams.insert(id, entry);

        inner.stats.total_connections += 1;
        *inner.stats.streams_mut(transport) += 1;
        self.stats_tx.send_replace(inner.stats.clone());

        Ok(id)
    }

    /// Release a session
    ///
    /// Unknown ids are ignored so cleanup paths can call this unconditionally.
    pub async fn disconnect(&self, id: u64) {
        let mut inner = self.inner.write().await;

        let Some(entry) = inner.streams.remove(&id) else {
            return;
        };

        let count = inner.stats.streams_mut(entry.transport);
        *count = count.saturating_sub(1);
        self.stats_tx.send_replace(inner.stats.clone());

        tracing::debug!(
            session_id = id,
            transport = %entry.transport,
            remote_ip = %entry.remote_addr,
            connected_secs = entry.duration().as_secs(),
            "Stream disconnected"
        );
    }

    /// Record that a listener for `transport` is accepting connections
    pub async fn listener_started(&self, transport: Transport) {
        let mut inner = self.inner.write().await;
        *inner.stats.listeners_mut(transport) += 1;
        self.stats_tx.send_replace(inner.stats.clone());
    }

    /// Record that a listener for `transport` has stopped
    pub async fn listener_stopped(&self, transport: Transport) {
        let mut inner = self.inner.write().await;
        let count = inner.stats.listeners_mut(transport);
        *count = count.saturating_sub(1);
        self.stats_tx.send_replace(inner.stats.clone());
    }

    /// Reject all future `connect` calls
    ///
    /// Sessions already registered are unaffected.
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        if !inner.closed {
            inner.closed = true;
            tracing::debug!(active = inner.streams.len(), "Stream registry closed");
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    /// Get a copy of a live session's entry
    pub async fn get(&self, id: u64) -> Option<StreamEntry> {
        self.inner.read().await.streams.get(&id).cloned()
    }

    /// Current counts
    pub fn snapshot(&self) -> ServerStats {
        self.stats_tx.borrow().clone()
    }

    /// Number of live sessions across all transports
    pub fn stream_count(&self) -> usize {
        self.stats_tx.borrow().active_streams()
    }

    /// Subscribe to count updates
    pub fn subscribe(&self) -> watch::Receiver<ServerStats> {
        self.stats_tx.subscribe()
    }

    /// Wait until no sessions remain
    ///
    /// With `Some(transport)` only sessions of that transport are considered.
    pub async fn wait_drained(&self, transport: Option<Transport>) {
        let mut rx = self.stats_tx.subscribe();
        let drained = |stats: &ServerStats| match transport {
            Some(t) => stats.streams(t) == 0,
            None => stats.active_streams() == 0,
        };

        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(drained).await;
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_connect_disconnect() {
        let registry = StreamRegistry::new();

        let id = registry.connect(Transport::Telnet, "127.0.0.1").await.unwrap();
        assert_eq!(registry.stream_count(), 1);

        let entry = registry.get(id).await.unwrap();
        assert_eq!(entry.transport, Transport::Telnet);
        assert_eq!(entry.remote_addr, "127.0.0.1");

        registry.disconnect(id).await;
        assert_eq!(registry.stream_count(), 0);
        assert!(registry.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_unknown_is_noop() {
        let registry = StreamRegistry::new();
        let id = registry.connect(Transport::Ssh, "10.0.0.1").await.unwrap();

        registry.disconnect(9999).await;
        registry.disconnect(id).await;
        registry.disconnect(id).await;

        let stats = registry.snapshot();
        assert_eq!(stats.active_streams(), 0);
        assert_eq!(stats.total_connections, 1);
    }

    #[tokio::test]
    async fn test_per_transport_counts() {
        let registry = StreamRegistry::new();

        registry.connect(Transport::Ssh, "a").await.unwrap();
        registry.connect(Transport::Ssh, "b").await.unwrap();
        let telnet = registry.connect(Transport::Telnet, "c").await.unwrap();

        let stats = registry.snapshot();
        assert_eq!(stats.streams(Transport::Ssh), 2);
        assert_eq!(stats.streams(Transport::Telnet), 1);

        registry.disconnect(telnet).await;
        let stats = registry.snapshot();
        assert_eq!(stats.streams(Transport::Ssh), 2);
        assert_eq!(stats.streams(Transport::Telnet), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connects_get_distinct_ids() {
        let registry = Arc::new(StreamRegistry::new());
        const N: usize = 64;
        const M: usize = 20;

        let mut handles = Vec::with_capacity(N);
        for i in 0..N {
            let registry = Arc::clone(&registry);
            let transport = if i % 2 == 0 {
                Transport::Ssh
            } else {
                Transport::Telnet
            };
            handles.push(tokio::spawn(async move {
                registry.connect(transport, format!("10.0.0.{i}")).await.unwrap()
            }));
        }

        let mut ids = Vec::with_capacity(N);
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        let unique: HashSet<u64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), N);

        let mut handles = Vec::with_capacity(M);
        for id in ids.into_iter().take(M) {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move { registry.disconnect(id).await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.stream_count(), N - M);
    }

    #[tokio::test]
    async fn test_closed_registry_rejects() {
        let registry = StreamRegistry::new();
        let id = registry.connect(Transport::Telnet, "a").await.unwrap();

        registry.close().await;
        assert!(registry.is_closed().await);

        let result = registry.connect(Transport::Telnet, "b").await;
        assert_eq!(result, Err(RegistryError::Closed));

        // Existing sessions can still leave
        registry.disconnect(id).await;
        assert_eq!(registry.stream_count(), 0);
    }

    #[tokio::test]
    async fn test_ids_not_reused() {
        let registry = StreamRegistry::new();

        let first = registry.connect(Transport::Ssh, "a").await.unwrap();
        registry.disconnect(first).await;
        let second = registry.connect(Transport::Ssh, "a").await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_listener_counts() {
        let registry = StreamRegistry::new();

        registry.listener_started(Transport::Telnet).await;
        registry.listener_started(Transport::Ssh).await;
        assert_eq!(registry.snapshot().listeners(Transport::Telnet), 1);
        assert_eq!(registry.snapshot().listeners(Transport::Ssh), 1);

        registry.listener_stopped(Transport::Telnet).await;
        registry.listener_stopped(Transport::Telnet).await;
        assert_eq!(registry.snapshot().listeners(Transport::Telnet), 0);
    }

    #[tokio::test]
    async fn test_wait_drained() {
        let registry = Arc::new(StreamRegistry::new());
        let ssh = registry.connect(Transport::Ssh, "a").await.unwrap();
        let telnet = registry.connect(Transport::Telnet, "b").await.unwrap();

        let waiter = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.wait_drained(Some(Transport::Ssh)).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        registry.disconnect(ssh).await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("ssh sessions should be drained")
            .unwrap();

        // Telnet session still holds the registry open overall
        let all = tokio::time::timeout(Duration::from_millis(10), registry.wait_drained(None)).await;
        assert!(all.is_err());

        registry.disconnect(telnet).await;
        registry.wait_drained(None).await;
    }
}
