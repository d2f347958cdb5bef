use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::models::UserId;

pub mod session;

/// Capacity of each connection's outbound frame queue.
pub const OUTBOUND_BUFFER: usize = 256;

struct ConnectionEntry {
    conn_id: Uuid,
    outbound: mpsc::Sender<String>,
}

/// Authoritative presence table: user id -> live connection.
///
/// At most one entry exists per user; registering a second connection
/// supersedes the first. All operations are linearizable through the
/// one read/write lock: register/unregister take the write lock,
/// presence checks and sends take the read lock.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<UserId, ConnectionEntry>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a connection for `user_id`. An existing entry is dropped,
    /// which closes its outbound queue and lets its write pump run down;
    /// superseding is silent from the caller's perspective.
    pub async fn register(&self, user_id: UserId, conn_id: Uuid, outbound: mpsc::Sender<String>) {
        let mut clients = self.inner.write().await;
        if let Some(old) = clients.insert(user_id, ConnectionEntry { conn_id, outbound }) {
            tracing::info!(%user_id, old_conn = %old.conn_id, "superseding existing websocket connection");
        } else {
            tracing::info!(%user_id, "websocket connection established");
        }
    }

    /// Removes the user's connection if present, closing its outbound
    /// queue. Idempotent; this is the forced-disconnect primitive.
    pub async fn unregister(&self, user_id: UserId) {
        let mut clients = self.inner.write().await;
        if clients.remove(&user_id).is_some() {
            tracing::info!(%user_id, "websocket connection closed");
        }
    }

    /// Teardown path for a connection's own reader: removes the entry only
    /// if it still belongs to `conn_id`, so a superseded connection's late
    /// teardown can never evict its successor.
    pub async fn unregister_conn(&self, user_id: UserId, conn_id: Uuid) {
        let mut clients = self.inner.write().await;
        match clients.get(&user_id) {
            Some(entry) if entry.conn_id == conn_id => {
                clients.remove(&user_id);
                tracing::info!(%user_id, "websocket connection closed");
            }
            _ => {}
        }
    }

    /// Point-in-time presence check; never touches the network.
    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    /// Enqueues a frame for the user's write pump. Returns `false`
    /// immediately when the user has no live connection or the queue is
    /// closed or full; never blocks.
    pub async fn send(&self, user_id: UserId, frame: String) -> bool {
        let clients = self.inner.read().await;
        match clients.get(&user_id) {
            Some(entry) => entry.outbound.try_send(frame).is_ok(),
            None => false,
        }
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(capacity: usize) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(capacity)
    }

    #[tokio::test]
    async fn register_supersedes_existing_connection() {
        let registry = ConnectionRegistry::new();
        let user = UserId(1);
        let (tx_a, mut rx_a) = channel(OUTBOUND_BUFFER);
        let (tx_b, mut rx_b) = channel(OUTBOUND_BUFFER);

        registry.register(user, Uuid::new_v4(), tx_a).await;
        registry.register(user, Uuid::new_v4(), tx_b).await;

        // Old queue is closed: its receiver drains to None.
        assert!(rx_a.recv().await.is_none());

        // Exactly one live entry, and sends reach the new connection.
        assert!(registry.is_online(user).await);
        assert_eq!(registry.online_count().await, 1);
        assert!(registry.send(user, "m".into()).await);
        assert_eq!(rx_b.recv().await.as_deref(), Some("m"));
    }

    #[tokio::test]
    async fn send_to_offline_user_is_false_not_error() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send(UserId(99), "m".into()).await);
        assert!(!registry.is_online(UserId(99)).await);
    }

    #[tokio::test]
    async fn frames_are_delivered_in_enqueue_order() {
        let registry = ConnectionRegistry::new();
        let user = UserId(2);
        let (tx, mut rx) = channel(OUTBOUND_BUFFER);
        registry.register(user, Uuid::new_v4(), tx).await;

        for frame in ["m1", "m2", "m3"] {
            assert!(registry.send(user, frame.into()).await);
        }
        assert_eq!(rx.recv().await.as_deref(), Some("m1"));
        assert_eq!(rx.recv().await.as_deref(), Some("m2"));
        assert_eq!(rx.recv().await.as_deref(), Some("m3"));
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = UserId(3);

        // Never-registered user: both calls are no-ops.
        registry.unregister(user).await;
        registry.unregister(user).await;

        let (tx, mut rx) = channel(OUTBOUND_BUFFER);
        registry.register(user, Uuid::new_v4(), tx).await;
        registry.unregister(user).await;
        registry.unregister(user).await;

        assert!(!registry.is_online(user).await);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stale_reader_cannot_evict_successor() {
        let registry = ConnectionRegistry::new();
        let user = UserId(4);
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        let (tx_a, _rx_a) = channel(OUTBOUND_BUFFER);
        let (tx_b, _rx_b) = channel(OUTBOUND_BUFFER);

        registry.register(user, conn_a, tx_a).await;
        registry.register(user, conn_b, tx_b).await;

        // The superseded connection's teardown fires late; B must survive.
        registry.unregister_conn(user, conn_a).await;
        assert!(registry.is_online(user).await);

        registry.unregister_conn(user, conn_b).await;
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn send_to_full_queue_is_false() {
        let registry = ConnectionRegistry::new();
        let user = UserId(5);
        let (tx, _rx) = channel(1);
        registry.register(user, Uuid::new_v4(), tx).await;

        assert!(registry.send(user, "first".into()).await);
        assert!(!registry.send(user, "overflow".into()).await);
    }
}
