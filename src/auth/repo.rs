use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, StoreError, User};

/// Persistence capability for user records.
///
/// `create` must enforce email uniqueness atomically: of two concurrent
/// creates with the same email, exactly one succeeds.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
}

/// Postgres-backed store. Uniqueness comes from the `users_email_key` index.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Duplicate)
            }
            Err(e) => Err(StoreError::Backend(anyhow::Error::new(e).context("insert user"))),
        }
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, email, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }
}

#[derive(Default)]
struct MemoryInner {
    by_id: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

/// In-process store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a user. Stands in for the administrative deletion path.
    pub async fn delete(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        match inner.by_id.remove(&id) {
            Some(user) => {
                inner.by_email.remove(&user.email);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        // Check and insert under one write guard.
        let mut inner = self.inner.write().await;
        if inner.by_email.contains_key(&new.email) {
            return Err(StoreError::Duplicate);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.by_email.insert(user.email.clone(), user.id);
        inner.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_email
            .get(email)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }
}
