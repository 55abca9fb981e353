/// Active-connection registry
///
/// One record per connected user, keyed by user id. A reconnect
/// overwrites the previous record (last-write-wins); multi-device
/// sessions are not tracked separately.
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

/// Sender half of the bridge into a session actor. Frames are
/// pre-serialized JSON envelopes.
pub type ConnectionSender = UnboundedSender<String>;

#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    /// Identifies the socket that created this record, so a stale
    /// socket's teardown cannot evict a newer connection
    pub conn_id: Uuid,
    pub sender: ConnectionSender,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, ConnectionRecord>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record for a user, stamping both
    /// timestamps to now. The replaced sender, if any, is dropped,
    /// which closes the previous connection's delivery channel.
    pub async fn upsert(&self, user_id: Uuid, conn_id: Uuid, sender: ConnectionSender) {
        let now = Utc::now();
        let record = ConnectionRecord {
            conn_id,
            sender,
            connected_at: now,
            last_activity: now,
        };

        let mut guard = self.inner.write().await;
        if guard.insert(user_id, record).is_some() {
            tracing::debug!(%user_id, "replaced existing connection record");
        }
    }

    /// Refresh the liveness stamp. No-op when the user has no entry,
    /// e.g. a late activity ping arriving after disconnect.
    pub async fn touch(&self, user_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(record) = guard.get_mut(&user_id) {
            record.last_activity = Utc::now();
        }
    }

    /// Unconditional removal, used by the liveness sweeper
    pub async fn remove(&self, user_id: Uuid) -> Option<ConnectionRecord> {
        self.inner.write().await.remove(&user_id)
    }

    /// Remove the record only if it still belongs to the given socket.
    /// Returns whether a record was removed.
    pub async fn remove_conn(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get(&user_id) {
            Some(record) if record.conn_id == conn_id => {
                guard.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn contains(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    pub async fn get(&self, user_id: Uuid) -> Option<ConnectionRecord> {
        self.inner.read().await.get(&user_id).cloned()
    }

    pub async fn sender_of(&self, user_id: Uuid) -> Option<ConnectionSender> {
        self.inner
            .read()
            .await
            .get(&user_id)
            .map(|record| record.sender.clone())
    }

    /// Current key set, for diagnostics
    pub async fn snapshot(&self) -> Vec<Uuid> {
        self.inner.read().await.keys().copied().collect()
    }

    pub async fn connected_users(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Send a frame to every connected user, skipping closed channels.
    /// Returns the number of deliveries attempted.
    pub async fn send_to_all(&self, frame: &str) -> usize {
        let guard = self.inner.read().await;
        let mut delivered = 0;
        for record in guard.values() {
            if record.sender.send(frame.to_string()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Remove entries that have been idle past `stale_after` AND whose
    /// delivery channel is closed. Entries inside the threshold are not
    /// re-verified; liveness is the channel's closed flag, not a probe.
    /// Returns the evicted user ids.
    pub async fn evict_stale(&self, stale_after: Duration) -> Vec<Uuid> {
        let now = Utc::now();
        let mut guard = self.inner.write().await;

        let stale: Vec<Uuid> = guard
            .iter()
            .filter(|(_, record)| {
                now - record.last_activity > stale_after && record.sender.is_closed()
            })
            .map(|(user_id, _)| *user_id)
            .collect();

        for user_id in &stale {
            guard.remove(user_id);
        }
        stale
    }

    /// Backdate a record's liveness stamp, for eviction tests
    #[cfg(test)]
    pub(crate) async fn backdate(&self, user_id: Uuid, seconds: i64) {
        let mut guard = self.inner.write().await;
        if let Some(record) = guard.get_mut(&user_id) {
            record.last_activity = Utc::now() - Duration::seconds(seconds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel() -> (ConnectionSender, tokio::sync::mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let (tx, _rx) = channel();

        registry.upsert(user_id, Uuid::new_v4(), tx).await;

        assert!(registry.contains(user_id).await);
        assert_eq!(registry.connected_users().await, 1);
        assert!(registry.sender_of(user_id).await.is_some());
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let first_conn = Uuid::new_v4();
        let second_conn = Uuid::new_v4();
        let (tx1, _rx1) = channel();
        let (tx2, mut rx2) = channel();

        registry.upsert(user_id, first_conn, tx1).await;
        registry.upsert(user_id, second_conn, tx2).await;

        assert_eq!(registry.connected_users().await, 1);
        let record = registry.get(user_id).await.unwrap();
        assert_eq!(record.conn_id, second_conn);

        // The surviving sender is the second one.
        record.sender.send("hello".to_string()).unwrap();
        assert_eq!(rx2.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_touch_refreshes_last_activity() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let (tx, _rx) = channel();

        registry.upsert(user_id, Uuid::new_v4(), tx).await;
        registry.backdate(user_id, 300).await;
        let before = registry.get(user_id).await.unwrap().last_activity;

        registry.touch(user_id).await;
        let after = registry.get(user_id).await.unwrap().last_activity;
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_touch_missing_user_is_noop() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        registry.touch(user_id).await;

        assert!(!registry.contains(user_id).await);
        assert_eq!(registry.connected_users().await, 0);
    }

    #[tokio::test]
    async fn test_remove_conn_requires_matching_socket() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let old_conn = Uuid::new_v4();
        let new_conn = Uuid::new_v4();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        registry.upsert(user_id, old_conn, tx1).await;
        registry.upsert(user_id, new_conn, tx2).await;

        // The old socket's teardown must not evict the reconnect.
        assert!(!registry.remove_conn(user_id, old_conn).await);
        assert!(registry.contains(user_id).await);

        assert!(registry.remove_conn(user_id, new_conn).await);
        assert!(!registry.contains(user_id).await);
    }

    #[tokio::test]
    async fn test_snapshot_lists_connected_users() {
        let registry = ConnectionRegistry::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut receivers = Vec::new();

        for id in &ids {
            let (tx, rx) = channel();
            registry.upsert(*id, Uuid::new_v4(), tx).await;
            receivers.push(rx);
        }

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        for id in ids {
            assert!(snapshot.contains(&id));
        }
    }

    #[tokio::test]
    async fn test_evict_stale_requires_both_idle_and_closed() {
        let registry = ConnectionRegistry::new();
        let idle_dead = Uuid::new_v4();
        let idle_alive = Uuid::new_v4();
        let fresh_dead = Uuid::new_v4();

        let (tx1, rx1) = channel();
        registry.upsert(idle_dead, Uuid::new_v4(), tx1).await;
        registry.backdate(idle_dead, 600).await;
        drop(rx1);

        let (tx2, _rx2_keepalive) = channel();
        registry.upsert(idle_alive, Uuid::new_v4(), tx2).await;
        registry.backdate(idle_alive, 600).await;

        let (tx3, rx3) = channel();
        registry.upsert(fresh_dead, Uuid::new_v4(), tx3).await;
        drop(rx3);

        let evicted = registry.evict_stale(Duration::seconds(120)).await;

        assert_eq!(evicted, vec![idle_dead]);
        assert!(!registry.contains(idle_dead).await);
        // Idle but with an open channel: trusted as alive.
        assert!(registry.contains(idle_alive).await);
        // Dead but recently active: not yet a candidate.
        assert!(registry.contains(fresh_dead).await);
    }

    #[tokio::test]
    async fn test_send_to_all_skips_closed_channels() {
        let registry = ConnectionRegistry::new();
        let alive = Uuid::new_v4();
        let dead = Uuid::new_v4();

        let (tx1, mut rx1) = channel();
        registry.upsert(alive, Uuid::new_v4(), tx1).await;
        let (tx2, rx2) = channel();
        registry.upsert(dead, Uuid::new_v4(), tx2).await;
        drop(rx2);

        let delivered = registry.send_to_all("ping").await;
        assert_eq!(delivered, 1);
        assert_eq!(rx1.recv().await.unwrap(), "ping");
    }
}
