/// Session-room membership
///
/// Personal rooms are implicit (the registry entry itself); this router
/// only tracks explicit session rooms, named by session id. No
/// authorization model is defined for session rooms: any authenticated
/// connection may join any session (see DESIGN.md).
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default, Clone)]
pub struct RoomRouter {
    inner: Arc<RwLock<HashMap<String, HashSet<Uuid>>>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, session_id: &str, user_id: Uuid) {
        if session_id.is_empty() {
            tracing::warn!(%user_id, "ignoring join for empty session id");
            return;
        }

        let mut guard = self.inner.write().await;
        let inserted = guard
            .entry(session_id.to_string())
            .or_default()
            .insert(user_id);
        if inserted {
            tracing::debug!(%user_id, session_id, "joined session room");
        }
    }

    pub async fn leave(&self, session_id: &str, user_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.get_mut(session_id) {
            members.remove(&user_id);
            if members.is_empty() {
                guard.remove(session_id);
            }
        }
    }

    /// Drop the user from every session room, returning the rooms left.
    /// Called on disconnect and sweep eviction.
    pub async fn leave_all(&self, user_id: Uuid) -> Vec<String> {
        let mut guard = self.inner.write().await;
        let mut left = Vec::new();

        guard.retain(|session_id, members| {
            if members.remove(&user_id) {
                left.push(session_id.clone());
            }
            !members.is_empty()
        });

        left
    }

    pub async fn members(&self, session_id: &str) -> Vec<Uuid> {
        self.inner
            .read()
            .await
            .get(session_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
