use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{auth::claims::Claims, config::JwtConfig};

/// Signing and verification keys, built once from configuration.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64).saturating_mul(60)),
        }
    }

    /// Signs a token as if issued at `now`. Same inputs give the same token.
    pub fn sign_at(
        &self,
        user_id: Uuid,
        email: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let ttl = i64::try_from(self.ttl.as_secs())
            .ok()
            .map(TimeDuration::seconds)
            .ok_or_else(|| anyhow::anyhow!("token ttl out of range"))?;
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| anyhow::anyhow!("token expiry out of range"))?;
        let claims = Claims {
            user_id,
            email: email.to_string(),
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn sign(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        self.sign_at(user_id, email, OffsetDateTime::now_utc())
    }

    /// Checks signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let validation = Validation::default();
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}
