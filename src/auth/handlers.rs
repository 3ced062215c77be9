use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{CredentialsRequest, LoginResponse, MessageResponse, ProfileResponse, RegisterResponse},
        extractors::AuthUser,
        services,
    },
    error::AuthError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/ping", get(ping))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/auth/profile", get(profile))
}

fn credentials(
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<CredentialsRequest, AuthError> {
    payload.map(|Json(body)| body).map_err(|e| {
        warn!(error = %e, "rejected request body");
        AuthError::validation("Invalid request data")
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let body = credentials(payload)?;
    let registered =
        services::register(state.users.as_ref(), &state.jwt, body.email, body.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully".into(),
            token: registered.token,
            user_id: registered.user.id,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    let body = credentials(payload).map_err(|_| AuthError::InvalidCredentials)?;
    let out = services::login(state.users.as_ref(), &state.jwt, body.email, body.password).await?;

    Ok(Json(LoginResponse {
        token: out.token,
        user_id: out.user_id,
    }))
}

#[instrument(skip_all, fields(user_id = %claims.user_id))]
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ProfileResponse>, AuthError> {
    let user = services::profile(state.users.as_ref(), claims.user_id).await?;
    Ok(Json(user.into()))
}

pub async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Auth service is reachable".into(),
    })
}
