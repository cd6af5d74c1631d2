use crate::AppState;
use crate::auth::generate_token;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use forum_core::error::ForumError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::LazyLock;

static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| bcrypt::hash("forum-unknown-user", bcrypt::DEFAULT_COST).ok());

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, ForumError> {
    let Json(body) = payload?;
    let config = state.config.load();
    let security = &config.security;

    let invalid = || ForumError::Auth("invalid username or password".into());

    // Unknown users are checked against a dummy hash so both paths cost one bcrypt run.
    let found = security.find_user(body.username.trim());
    let hash = match found {
        Some((_, entry)) => entry.password_hash.as_str(),
        None => DUMMY_HASH.as_deref().unwrap_or_default(),
    };
    let verified = !hash.is_empty() && bcrypt::verify(&body.password, hash).unwrap_or(false);

    let Some((user_id, entry)) = found.filter(|_| verified) else {
        tracing::info!(user = %body.username.trim(), "Login rejected");
        return Err(invalid());
    };

    let secret = security
        .resolve_jwt_secret()
        .ok_or_else(|| ForumError::Config("JWT secret not configured".into()))?;

    let token = generate_token(user_id, &entry.username, &secret, security.jwt_ttl_secs)
        .map_err(|e| ForumError::Internal(format!("failed to generate token: {e}")))?;

    tracing::info!(user = %entry.username, "Login succeeded");
    Ok(Json(json!({
        "token": token,
        "expires_in": security.jwt_ttl_secs,
        "token_type": "Bearer",
    })))
}
