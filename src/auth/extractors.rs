use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::{claims::Claims, jwt::JwtKeys};
use crate::error::AuthError;

const SCHEME: &str = "Bearer";

/// Validated session claims for the current request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

/// Pulls the raw token out of `Authorization: Bearer <token>`.
///
/// Absent header is `MissingToken`. Anything that is not exactly two
/// whitespace-separated parts with the literal `Bearer` first is `MalformedToken`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = value.to_str().map_err(|_| AuthError::MalformedToken)?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(SCHEME), Some(token), None) => Ok(token),
        _ => Err(AuthError::MalformedToken),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).map_err(|e| {
            warn!(reason = %e, "rejected authorization header");
            e
        })?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AuthError::InvalidToken
        })?;

        Ok(AuthUser(claims))
    }
}
