/// WebSocket session handling
///
/// `GET /ws?token=...&sessions=a,b` authenticates the handshake, places
/// the connection in its personal room (the registry entry keyed by
/// user id), optionally auto-joins session rooms, and bridges the
/// registry's delivery channel into the session actor.
use crate::error::AppError;
use crate::metrics;
use crate::models::UserStatus;
use crate::services::auth;
use crate::state::AppState;
use crate::websocket::{messages, ClientMessage};
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
    /// Comma-separated session ids to auto-join on connect
    pub sessions: Option<String>,
}

/// Frame forwarded from the connection registry to the session actor
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct OutboundFrame(String);

pub struct WsSession {
    user_id: Uuid,
    username: String,
    conn_id: Uuid,
    state: AppState,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    fn new(user_id: Uuid, username: String, conn_id: Uuid, state: AppState) -> Self {
        let presence_cfg = &state.config.presence;
        let heartbeat_interval = Duration::from_secs(presence_cfg.heartbeat_interval_secs);
        let client_timeout = Duration::from_secs(presence_cfg.client_timeout_secs);
        Self {
            user_id,
            username,
            conn_id,
            state,
            hb: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.client_timeout {
                tracing::warn!(user_id = %act.user_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Transport-level liveness also counts as registry activity
    fn touch(&self) {
        let registry = self.state.presence.registry().clone();
        let user_id = self.user_id;
        actix::spawn(async move {
            registry.touch(user_id).await;
        });
    }

    fn handle_client_message(&mut self, msg: ClientMessage) {
        let user_id = self.user_id;
        match msg {
            ClientMessage::Activity => {
                self.hb = Instant::now();
                self.touch();
            }
            ClientMessage::JoinSession { session_id } => {
                let rooms = self.state.presence.rooms().clone();
                actix::spawn(async move {
                    rooms.join(&session_id, user_id).await;
                });
            }
            ClientMessage::LeaveSession { session_id } => {
                let rooms = self.state.presence.rooms().clone();
                actix::spawn(async move {
                    rooms.leave(&session_id, user_id).await;
                });
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user_id,
            username = %self.username,
            "WebSocket session started"
        );
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "WebSocket session stopped");

        let presence = self.state.presence.clone();
        let user_id = self.user_id;
        let conn_id = self.conn_id;

        actix::spawn(async move {
            // Guarded removal: if the user already reconnected, the
            // registry holds a newer record that must survive this
            // socket's teardown.
            if presence.registry().remove_conn(user_id, conn_id).await {
                presence.rooms().leave_all(user_id).await;
                presence
                    .broadcaster()
                    .broadcast_status(user_id, UserStatus::Offline)
                    .await;
                metrics::set_active_connections(presence.registry().connected_users().await as i64);
            }
        });
    }
}

impl Handler<OutboundFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                self.touch();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
                self.touch();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => self.handle_client_message(msg),
                Err(e) => {
                    tracing::warn!(user_id = %self.user_id, error = %e, "ignoring malformed frame");
                }
            },
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(user_id = %self.user_id, "binary frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(user_id = %self.user_id, ?reason, "close frame received");
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, actix_web::Error> {
    let params = query.into_inner();

    // Authentication: bearer token from the query string or the
    // Authorization header, resolved against the user directory.
    let token = params
        .token
        .clone()
        .or_else(|| auth::bearer_token(&req))
        .ok_or(AppError::TokenMissing)?;
    let claims = auth::verify_token(&token, &state.config.auth.jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::TokenInvalid("token subject is not a user id".to_string()))?;
    let profile = state
        .directory
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::UserNotFound(user_id))?;

    let presence = state.presence.clone();
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let session = WsSession::new(user_id, profile.username.clone(), conn_id, state.get_ref().clone());
    let (addr, resp) = ws::WsResponseBuilder::new(session, &req, stream).start_with_addr()?;

    // Personal-room placement, only once the upgrade has been accepted:
    // a failed handshake must never displace an existing live record.
    // A reconnect overwrites the previous record, closing its delivery
    // channel.
    presence.registry().upsert(user_id, conn_id, tx.clone()).await;
    metrics::set_active_connections(presence.registry().connected_users().await as i64);

    if let Some(sessions) = params.sessions.as_deref() {
        for session_id in sessions.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            presence.rooms().join(session_id, user_id).await;
        }
    }

    // Bridge the registry's delivery channel into the session actor.
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            addr.do_send(OutboundFrame(frame));
        }
    });

    let _ = tx.send(messages::connected_frame(user_id, &profile.username));

    let broadcaster = presence.broadcaster().clone();
    tokio::spawn(async move {
        broadcaster.broadcast_status(user_id, UserStatus::Online).await;
    });

    Ok(resp)
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(ws_handler);
}
