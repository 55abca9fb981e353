use crate::error::AppError;
use crate::models::UserProfile;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// User-lookup collaborator consumed by the WebSocket handshake.
///
/// The realtime core never touches user storage directly; it only needs
/// to resolve a token subject to a minimal profile (or a not-found
/// signal) before admitting a connection.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserProfile>, AppError>;
}

/// Postgres-backed directory over the shared `users` table
pub struct PgUserDirectory {
    db: PgPool,
}

impl PgUserDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query("SELECT id, username FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|r| UserProfile {
            id: r.get("id"),
            username: r.get("username"),
        }))
    }
}
