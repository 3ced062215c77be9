use serde::Deserialize;

#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

// Hand-written so the secret never ends up in logs.
impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    /// Postgres connection string; `None` selects the in-memory user store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
}

pub const DEFAULT_TTL_MINUTES: i64 = 60 * 24;
/// Five years.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365 * 5;

/// Unset or unparsable falls back to the default; out-of-range is an error.
pub fn parse_ttl_minutes(raw: Option<&str>) -> anyhow::Result<i64> {
    let Some(minutes) = raw.and_then(|v| v.trim().parse::<i64>().ok()) else {
        return Ok(DEFAULT_TTL_MINUTES);
    };
    if !(1..=MAX_TTL_MINUTES).contains(&minutes) {
        anyhow::bail!("JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}, got {minutes}");
    }
    Ok(minutes)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;
        if secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let jwt = JwtConfig {
            secret,
            ttl_minutes: parse_ttl_minutes(std::env::var("JWT_TTL_MINUTES").ok().as_deref())?,
        };

        let port = std::env::var("PORT")
            .or_else(|_| std::env::var("APP_PORT"))
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(3001);

        Ok(Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or_else(|_| "auth-service".into()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            jwt,
            cors: CorsConfig {
                allowed_origin: std::env::var("CORS_ORIGIN")
                    .unwrap_or_else(|_| "http://localhost:8080".into()),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
