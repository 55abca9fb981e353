use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimal user profile resolved during the WebSocket handshake
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
}

/// Presence status announced on connect, disconnect, and sweep eviction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Online => "online",
            UserStatus::Offline => "offline",
        }
    }
}

/// Transient notification payload delivered over the personal room.
///
/// Not persisted here. Callers that need a durable record are expected to
/// store notifications through their own persistence layer; this service
/// only delivers to currently-connected clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub read: bool,
    /// Epoch milliseconds, matching the stamp the broadcast facade puts
    /// on ad-hoc payloads
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_status_serialization() {
        assert_eq!(serde_json::to_string(&UserStatus::Online).unwrap(), "\"online\"");
        assert_eq!(serde_json::to_string(&UserStatus::Offline).unwrap(), "\"offline\"");
        assert_eq!(UserStatus::Online.as_str(), "online");
    }

    #[test]
    fn test_notification_payload_defaults() {
        let payload = NotificationPayload::new("New match", "Ana wants to learn Rust");
        assert!(!payload.read);
        assert_eq!(payload.title, "New match");

        let json = serde_json::to_value(&payload).unwrap();
        // createdAt goes over the wire as epoch millis, the same format
        // the broadcast facade stamps onto ad-hoc payloads.
        assert!(json["createdAt"].is_i64());
        assert_eq!(json.get("read"), Some(&serde_json::Value::Bool(false)));
    }
}
