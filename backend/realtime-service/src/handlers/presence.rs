/// HTTP surface over the broadcast facade and registry.
///
/// This is how the rest of the SkillBarter backend (and operators)
/// reach the realtime layer: match/session route handlers call the
/// notify endpoints after persisting their own records, treating the
/// `delivered` flag as best-effort only.
use crate::models::NotificationPayload;
use crate::state::AppState;
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde_json::{json, Value};
use uuid::Uuid;

/// Connection status for a user
///
/// Endpoint: GET /api/v1/presence/status/{user_id}
pub async fn presence_status(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();

    match state.presence.registry().get(user_id).await {
        Some(record) => Ok(HttpResponse::Ok().json(json!({
            "userId": user_id.to_string(),
            "connected": true,
            "connectedAt": record.connected_at,
            "lastActivityAt": record.last_activity,
        }))),
        None => Ok(HttpResponse::Ok().json(json!({
            "userId": user_id.to_string(),
            "connected": false,
        }))),
    }
}

/// Snapshot of currently-connected user ids
///
/// Endpoint: GET /api/v1/presence/users
pub async fn connected_users(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let user_ids = state.presence.registry().snapshot().await;

    Ok(HttpResponse::Ok().json(json!({
        "count": user_ids.len(),
        "users": user_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>(),
    })))
}

/// Deliver a notification to a single user's personal room
///
/// Endpoint: POST /api/v1/presence/notify/{user_id}
/// Body: {"event"?, "title", "message", ...extra fields}
pub async fn notify_user(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
    body: web::Json<Value>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let event = body
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("notification")
        .to_string();

    let base = NotificationPayload::new(
        body.get("title").and_then(|v| v.as_str()).unwrap_or("Notification"),
        body.get("message").and_then(|v| v.as_str()).unwrap_or(""),
    );
    let mut payload = serde_json::to_value(&base).unwrap_or_else(|_| json!({}));
    if let (Some(target), Some(extra)) = (payload.as_object_mut(), body.as_object()) {
        for (key, value) in extra {
            if key != "event" {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    let delivered = state
        .presence
        .broadcaster()
        .notify_user(user_id, &event, payload)
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "userId": user_id.to_string(),
        "event": event,
        "delivered": delivered,
    })))
}

/// Deliver an event to every member of a session room
///
/// Endpoint: POST /api/v1/presence/sessions/{session_id}/notify
/// Body: {"event"?, ...payload}
pub async fn notify_session(
    path: web::Path<String>,
    state: web::Data<AppState>,
    body: web::Json<Value>,
) -> ActixResult<HttpResponse> {
    let session_id = path.into_inner();
    let event = body
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("session:update")
        .to_string();

    let mut payload = body.into_inner();
    if let Some(map) = payload.as_object_mut() {
        map.remove("event");
    }

    let delivered = state
        .presence
        .broadcaster()
        .notify_session(&session_id, &event, payload)
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "sessionId": session_id,
        "event": event,
        "delivered": delivered,
    })))
}

/// Deliver an event to every connected user (operator tool)
///
/// Endpoint: POST /api/v1/presence/broadcast
pub async fn broadcast(
    state: web::Data<AppState>,
    body: web::Json<Value>,
) -> ActixResult<HttpResponse> {
    let event = body
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("announcement")
        .to_string();

    let mut payload = body.into_inner();
    if let Some(map) = payload.as_object_mut() {
        map.remove("event");
    }

    let recipients = state
        .presence
        .broadcaster()
        .broadcast_all(&event, payload)
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "event": event,
        "recipients": recipients,
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/presence")
            .route("/status/{user_id}", web::get().to(presence_status))
            .route("/users", web::get().to(connected_users))
            .route("/notify/{user_id}", web::post().to(notify_user))
            .route("/sessions/{session_id}/notify", web::post().to(notify_session))
            .route("/broadcast", web::post().to(broadcast)),
    );
}
