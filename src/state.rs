use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::{MemoryUserStore, PgUserStore, UserStore},
    },
    config::{AppConfig, CorsConfig, JwtConfig},
    metrics::Metrics,
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub metrics: Metrics,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres user store");
                Arc::new(PgUserStore::new(db))
            }
            None => {
                warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                Arc::new(MemoryUserStore::new())
            }
        };

        Self::from_parts(users, config)
    }

    pub fn from_parts(users: Arc<dyn UserStore>, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        Ok(Self {
            jwt: JwtKeys::from_config(&config.jwt),
            metrics: Metrics::new()?,
            users,
            config,
        })
    }

    /// Test configuration with an in-memory store.
    pub fn fake_config() -> AppConfig {
        AppConfig {
            service_name: "auth-service".into(),
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            jwt: JwtConfig {
                secret: "test_secret".into(),
                ttl_minutes: crate::config::DEFAULT_TTL_MINUTES,
            },
            cors: CorsConfig {
                allowed_origin: "http://localhost:8080".into(),
            },
        }
    }

    pub fn fake() -> anyhow::Result<Self> {
        Self::from_parts(Arc::new(MemoryUserStore::new()), Arc::new(Self::fake_config()))
    }
}
