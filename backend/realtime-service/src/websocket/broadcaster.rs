/// Broadcast facade
///
/// The only sanctioned way the rest of the backend triggers real-time
/// delivery. Every operation is fire-and-forget: transport failures are
/// caught, logged, and surfaced as a boolean return, never propagated.
/// Callers that need a durable record must persist notifications
/// through their own store; an offline recipient simply misses the
/// event.
use super::messages::{self, EVENT_USER_STATUS};
use super::registry::ConnectionRegistry;
use super::rooms::RoomRouter;
use crate::metrics;
use crate::models::UserStatus;
use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
    rooms: RoomRouter,
}

fn as_object(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    }
}

/// Fill in the notification fields callers commonly omit. Existing
/// values are preserved.
fn stamp_notification(payload: Value) -> Value {
    let mut map = as_object(payload);
    map.entry("id")
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    map.entry("createdAt")
        .or_insert_with(|| json!(Utc::now().timestamp_millis()));
    map.entry("read").or_insert(Value::Bool(false));
    Value::Object(map)
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry, rooms: RoomRouter) -> Self {
        Self { registry, rooms }
    }

    /// Deliver an event to a single user's personal room.
    ///
    /// Returns whether delivery was attempted, not whether the client
    /// received anything. A nil recipient and an offline recipient both
    /// yield `false` without a transport write.
    pub async fn notify_user(&self, user_id: Uuid, event: &str, payload: Value) -> bool {
        if user_id.is_nil() {
            tracing::warn!(event, "notify_user called without a recipient");
            return false;
        }

        let sender = match self.registry.sender_of(user_id).await {
            Some(sender) => sender,
            None => {
                tracing::debug!(%user_id, event, "recipient not connected, dropping event");
                metrics::observe_delivery(event, false);
                return false;
            }
        };

        let frame = messages::envelope(event, stamp_notification(payload));
        match sender.send(frame) {
            Ok(()) => {
                metrics::observe_delivery(event, true);
                true
            }
            Err(err) => {
                tracing::warn!(%user_id, event, error = %err, "delivery failed");
                metrics::observe_delivery(event, false);
                false
            }
        }
    }

    /// Deliver an event to every current member of a session room,
    /// stamped with the session id and a timestamp. Returns whether at
    /// least one delivery was attempted.
    pub async fn notify_session(&self, session_id: &str, event: &str, payload: Value) -> bool {
        if session_id.is_empty() {
            tracing::warn!(event, "notify_session called without a session id");
            return false;
        }

        let members = self.rooms.members(session_id).await;
        if members.is_empty() {
            tracing::debug!(session_id, event, "session room has no members, dropping event");
            metrics::observe_delivery(event, false);
            return false;
        }

        let mut map = as_object(payload);
        map.insert("sessionId".to_string(), json!(session_id));
        map.insert(
            "timestamp".to_string(),
            json!(Utc::now().timestamp_millis()),
        );
        let frame = messages::envelope(event, Value::Object(map));

        let mut attempted = false;
        for user_id in members {
            if let Some(sender) = self.registry.sender_of(user_id).await {
                if sender.send(frame.clone()).is_ok() {
                    attempted = true;
                }
            }
        }

        metrics::observe_delivery(event, attempted);
        attempted
    }

    /// Deliver an event to every connected user. Returns the number of
    /// deliveries attempted.
    pub async fn broadcast_all(&self, event: &str, payload: Value) -> usize {
        let frame = messages::envelope(event, payload);
        self.registry.send_to_all(&frame).await
    }

    /// Announce a presence change to all connected parties
    pub async fn broadcast_status(&self, user_id: Uuid, status: UserStatus) -> usize {
        let frame = messages::user_status_frame(user_id, status);
        let delivered = self.registry.send_to_all(&frame).await;
        metrics::observe_delivery(EVENT_USER_STATUS, delivered > 0);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn setup() -> (Broadcaster, ConnectionRegistry, RoomRouter) {
        let registry = ConnectionRegistry::new();
        let rooms = RoomRouter::new();
        let broadcaster = Broadcaster::new(registry.clone(), rooms.clone());
        (broadcaster, registry, rooms)
    }

    async fn connect(
        registry: &ConnectionRegistry,
        user_id: Uuid,
    ) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.upsert(user_id, Uuid::new_v4(), tx).await;
        rx
    }

    #[tokio::test]
    async fn test_notify_user_delivers_stamped_payload() {
        let (broadcaster, registry, _rooms) = setup();
        let user_id = Uuid::new_v4();
        let mut rx = connect(&registry, user_id).await;

        let attempted = broadcaster
            .notify_user(user_id, "notification", json!({ "title": "New match" }))
            .await;
        assert!(attempted);

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "notification");
        assert_eq!(frame["payload"]["title"], "New match");
        assert_eq!(frame["payload"]["read"], false);
        assert!(frame["payload"]["id"].is_string());
        assert!(frame["payload"]["createdAt"].is_i64());
    }

    #[tokio::test]
    async fn test_notify_user_preserves_caller_fields() {
        let (broadcaster, registry, _rooms) = setup();
        let user_id = Uuid::new_v4();
        let mut rx = connect(&registry, user_id).await;

        broadcaster
            .notify_user(
                user_id,
                "notification",
                json!({ "id": "fixed-id", "read": true, "matchId": "m-7" }),
            )
            .await;

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["payload"]["id"], "fixed-id");
        assert_eq!(frame["payload"]["read"], true);
        assert_eq!(frame["payload"]["matchId"], "m-7");
    }

    #[tokio::test]
    async fn test_notify_user_offline_returns_false() {
        let (broadcaster, _registry, _rooms) = setup();

        let attempted = broadcaster
            .notify_user(Uuid::new_v4(), "notification", json!({}))
            .await;
        assert!(!attempted);
    }

    #[tokio::test]
    async fn test_notify_user_nil_recipient_returns_false() {
        let (broadcaster, _registry, _rooms) = setup();

        let attempted = broadcaster
            .notify_user(Uuid::nil(), "notification", json!({}))
            .await;
        assert!(!attempted);
    }

    #[tokio::test]
    async fn test_notify_user_closed_channel_returns_false() {
        let (broadcaster, registry, _rooms) = setup();
        let user_id = Uuid::new_v4();
        let rx = connect(&registry, user_id).await;
        drop(rx);

        let attempted = broadcaster
            .notify_user(user_id, "notification", json!({}))
            .await;
        assert!(!attempted);
    }

    #[tokio::test]
    async fn test_notify_session_reaches_members_until_they_leave() {
        let (broadcaster, registry, rooms) = setup();
        let user_id = Uuid::new_v4();
        let mut rx = connect(&registry, user_id).await;

        rooms.join("sess-9", user_id).await;
        assert!(
            broadcaster
                .notify_session("sess-9", "session:update", json!({ "topic": "Rust" }))
                .await
        );

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "session:update");
        assert_eq!(frame["payload"]["sessionId"], "sess-9");
        assert_eq!(frame["payload"]["topic"], "Rust");
        assert!(frame["payload"]["timestamp"].is_i64());

        rooms.leave("sess-9", user_id).await;
        assert!(
            !broadcaster
                .notify_session("sess-9", "session:update", json!({}))
                .await
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_session_empty_id_returns_false() {
        let (broadcaster, _registry, _rooms) = setup();
        assert!(!broadcaster.notify_session("", "session:update", json!({})).await);
    }

    #[tokio::test]
    async fn test_broadcast_status_reaches_everyone() {
        let (broadcaster, registry, _rooms) = setup();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let mut rx_a = connect(&registry, user_a).await;
        let mut rx_b = connect(&registry, user_b).await;

        let delivered = broadcaster.broadcast_status(user_a, UserStatus::Online).await;
        assert_eq!(delivered, 2);

        for rx in [&mut rx_a, &mut rx_b] {
            let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(frame["type"], "user:status");
            assert_eq!(frame["payload"]["status"], "online");
            assert_eq!(frame["payload"]["userId"], user_a.to_string());
        }
    }

    #[tokio::test]
    async fn test_broadcast_all_counts_attempts() {
        let (broadcaster, registry, _rooms) = setup();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            receivers.push(connect(&registry, Uuid::new_v4()).await);
        }

        let delivered = broadcaster
            .broadcast_all("announcement", json!({ "message": "maintenance at noon" }))
            .await;
        assert_eq!(delivered, 3);
    }
}
