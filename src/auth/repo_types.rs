use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the store.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,                     // unique user ID, immutable
    pub email: String,                // identity key, stored as submitted
    pub password_hash: String,        // Argon2 PHC string, never sent to clients
    pub created_at: OffsetDateTime,   // creation timestamp
}

/// Fields needed to insert a user; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    Duplicate,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
