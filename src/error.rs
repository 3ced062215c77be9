use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Failures surfaced at the HTTP boundary, each rendered as `{ "message": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Email already in use")]
    Conflict,
    /// Same text for unknown email and wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Token missing")]
    MissingToken,
    #[error("Token malformed")]
    MalformedToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("User not found")]
    NotFound,
    #[error("Internal server error")]
    Internal(anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::Conflict => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::MalformedToken
            | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AuthError::Validation(msg.into())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(e: anyhow::Error) -> Self {
        AuthError::Internal(e)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AuthError::Internal(ref e) = self {
            error!(error = %e, "request failed");
        }
        let body = Json(ErrorBody {
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
