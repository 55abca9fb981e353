/// Liveness sweeper and the presence service that owns it.
///
/// The sweep evicts registry entries that are both idle past the
/// activity threshold and whose delivery channel is closed, then
/// announces the status change globally. Entries inside the threshold
/// are never re-verified and liveness is a boolean channel flag, not an
/// active probe: a silently dead connection that keeps getting touched
/// by a stale client timer will survive the sweep (see DESIGN.md).
use super::broadcaster::Broadcaster;
use super::registry::ConnectionRegistry;
use super::rooms::RoomRouter;
use crate::metrics;
use crate::models::UserStatus;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// One sweep pass: evict, drop room memberships, announce. Returns the
/// number of evicted connections.
pub async fn sweep_once(
    registry: &ConnectionRegistry,
    rooms: &RoomRouter,
    broadcaster: &Broadcaster,
    stale_after: chrono::Duration,
) -> usize {
    let evicted = registry.evict_stale(stale_after).await;

    for user_id in &evicted {
        let left = rooms.leave_all(*user_id).await;
        tracing::info!(%user_id, rooms_left = left.len(), "evicted stale connection");
        broadcaster
            .broadcast_status(*user_id, UserStatus::Offline)
            .await;
    }

    if !evicted.is_empty() {
        metrics::inc_evictions(evicted.len() as u64);
        metrics::set_active_connections(registry.connected_users().await as i64);
    }

    evicted.len()
}

/// Owns the registry, room router, broadcast facade, and the sweeper
/// task. Constructed once in `main` and injected through `AppState`;
/// tests build isolated instances.
pub struct PresenceService {
    registry: ConnectionRegistry,
    rooms: RoomRouter,
    broadcaster: Broadcaster,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Default for PresenceService {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceService {
    pub fn new() -> Self {
        let registry = ConnectionRegistry::new();
        let rooms = RoomRouter::new();
        let broadcaster = Broadcaster::new(registry.clone(), rooms.clone());
        Self {
            registry,
            rooms,
            broadcaster,
            sweeper: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomRouter {
        &self.rooms
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Spawn the recurring sweep. Calling again replaces the previous
    /// task. Must run inside a tokio runtime.
    pub fn start_sweeper(&self, interval: Duration, stale_after: chrono::Duration) {
        let registry = self.registry.clone();
        let rooms = self.rooms.clone();
        let broadcaster = self.broadcaster.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sweep_once(&registry, &rooms, &broadcaster, stale_after).await;
            }
        });

        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(previous) = guard.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop the sweeper task. Idempotent.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
                tracing::info!("presence sweeper stopped");
            }
        }
    }
}

impl Drop for PresenceService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
