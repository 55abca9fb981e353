/// Wire frames for the realtime WebSocket layer.
///
/// Inbound frames are tagged JSON objects; outbound frames are
/// `{"type": <event>, "payload": {...}}` envelopes so that callers of
/// the broadcast facade can use arbitrary event names.
use crate::models::UserStatus;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Event name for direct-to-user notifications
pub const EVENT_NOTIFICATION: &str = "notification";
/// Event name for global presence announcements
pub const EVENT_USER_STATUS: &str = "user:status";
/// Event name for the post-handshake confirmation frame
pub const EVENT_CONNECTED: &str = "connected";

/// Frames accepted from clients after the handshake
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Refreshes the connection's liveness stamp
    #[serde(rename = "activity")]
    Activity,

    /// Joins the connection to a session room
    #[serde(rename = "join:session", rename_all = "camelCase")]
    JoinSession { session_id: String },

    /// Removes the connection from a session room
    #[serde(rename = "leave:session", rename_all = "camelCase")]
    LeaveSession { session_id: String },
}

/// Wrap a payload in the outbound event envelope
pub fn envelope(event: &str, payload: Value) -> String {
    json!({ "type": event, "payload": payload }).to_string()
}

/// Confirmation frame sent once the handshake has been accepted
pub fn connected_frame(user_id: Uuid, username: &str) -> String {
    envelope(
        EVENT_CONNECTED,
        json!({
            "userId": user_id,
            "username": username,
            "timestamp": Utc::now().timestamp_millis(),
        }),
    )
}

/// Global presence announcement
pub fn user_status_frame(user_id: Uuid, status: UserStatus) -> String {
    envelope(
        EVENT_USER_STATUS,
        json!({
            "userId": user_id,
            "status": status.as_str(),
            "timestamp": Utc::now().timestamp_millis(),
        }),
    )
}
