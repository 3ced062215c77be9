use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::JwtKeys,
        password,
        repo::UserStore,
        repo_types::{NewUser, StoreError, User},
    },
    error::AuthError,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

#[derive(Debug)]
pub struct Registered {
    pub user: User,
    pub token: String,
}

#[derive(Debug)]
pub struct LoggedIn {
    pub user_id: Uuid,
    pub token: String,
}

fn require(field: Option<String>) -> Result<String, AuthError> {
    match field {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthError::validation("Email and password are required")),
    }
}

async fn hash_blocking(plain: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| AuthError::Internal(e.into()))?
        .map_err(AuthError::Internal)
}

async fn verify_blocking(plain: String, hash: Option<String>) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => password::verify_password(&plain, &hash),
        None => {
            password::verify_dummy(&plain);
            Ok(false)
        }
    })
    .await
    .map_err(|e| AuthError::Internal(e.into()))?
    .map_err(AuthError::Internal)
}

/// Creates a user and issues their first session token.
pub async fn register(
    store: &dyn UserStore,
    keys: &JwtKeys,
    email: Option<String>,
    password: Option<String>,
) -> Result<Registered, AuthError> {
    let email = require(email)?;
    let password = require(password)?;

    if !is_valid_email(&email) {
        warn!("register rejected: invalid email");
        return Err(AuthError::validation("Invalid email"));
    }

    // Fast path only; the store enforces uniqueness on insert.
    if store.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AuthError::Conflict);
    }

    let password_hash = hash_blocking(password).await?;

    let user = match store.create(NewUser { email, password_hash }).await {
        Ok(u) => u,
        Err(StoreError::Duplicate) => {
            warn!("email registered concurrently");
            return Err(AuthError::Conflict);
        }
        Err(StoreError::Backend(e)) => return Err(AuthError::Internal(e)),
    };

    let token = keys.sign(user.id, &user.email)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Registered { user, token })
}

/// Verifies credentials and issues a fresh session token.
pub async fn login(
    store: &dyn UserStore,
    keys: &JwtKeys,
    email: Option<String>,
    password: Option<String>,
) -> Result<LoggedIn, AuthError> {
    // Incomplete credentials fail the same way as wrong ones.
    let (Ok(email), Ok(password)) = (require(email), require(password)) else {
        warn!("login rejected: incomplete credentials");
        return Err(AuthError::InvalidCredentials);
    };

    let user = store.find_by_email(&email).await?;
    let ok = verify_blocking(password, user.as_ref().map(|u| u.password_hash.clone())).await?;

    let user = match user {
        Some(u) if ok => u,
        Some(u) => {
            warn!(user_id = %u.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }
        None => {
            warn!("login unknown email");
            return Err(AuthError::InvalidCredentials);
        }
    };

    let token = keys.sign(user.id, &user.email)?;
    info!(user_id = %user.id, "user logged in");
    Ok(LoggedIn {
        user_id: user.id,
        token,
    })
}

pub async fn profile(store: &dyn UserStore, user_id: Uuid) -> Result<User, AuthError> {
    store.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(user_id = %user_id, "token refers to missing user");
        AuthError::NotFound
    })
}
