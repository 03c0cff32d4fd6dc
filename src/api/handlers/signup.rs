use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::response::{kind, ApiError, AppJson, JSend};
use crate::storage::models::{CodeAttempt, CodeFlow, User};
use crate::tokens::pair;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyCodeRequest {
    pub code: String,
    pub signup_key: Uuid,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SignUpRequest {
    pub name: String,
    pub signup_key: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn verify_code(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<VerifyCodeRequest>,
) -> Result<Json<JSend<()>>, ApiError> {
    let mut attempt = signup_attempt(&state, req.signup_key)?;

    if attempt.code != req.code {
        return Err(ApiError::bad_request(
            kind::WRONG_CODE,
            "Wrong phone verification code",
        ));
    }

    attempt.verified = true;
    state
        .db
        .put_code_attempt(&attempt)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::debug!(signup_key = %attempt.key, "Verified sign-up code");
    Ok(JSend::success(()))
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SignUpRequest>,
) -> Result<Json<JSend<SignUpResponse>>, ApiError> {
    validate_signup(&req)?;

    let attempt = signup_attempt(&state, req.signup_key)?;
    if !attempt.verified {
        return Err(ApiError::bad_request(
            kind::SIGNUP_NOT_VERIFIED,
            "Phone is not verified for this sign-up key",
        ));
    }

    let taken = state
        .db
        .username_exists(&req.username)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if taken {
        return Err(ApiError::conflict(
            kind::USERNAME_ALREADY_EXISTS,
            "Username already exists",
        ));
    }

    let user = User {
        created_at: Utc::now(),
        id: Uuid::new_v4().to_string(),
        name: req.name,
        phone: attempt.phone.clone(),
        username: req.username,
    };
    state
        .db
        .put_user(&user)
        .map_err(|e| ApiError::internal(format!("Failed to store user: {e}")))?;

    // The attempt is spent regardless of what happens next
    state
        .db
        .delete_code_attempt(&attempt.key)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let tokens = pair::issue(&state.db, &state.config.tokens, &user.id)
        .map_err(|e| ApiError::internal(format!("Failed to issue tokens: {e}")))?;

    tracing::debug!(user_id = %user.id, username = %user.username, "Created user");

    Ok(JSend::success(SignUpResponse {
        access_token: tokens.access.token,
        refresh_token: tokens.refresh.token,
        user_id: user.id,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn signup_attempt(state: &AppState, key: Uuid) -> Result<CodeAttempt, ApiError> {
    let attempt = state
        .db
        .get_code_attempt(&key.to_string())
        .map_err(|e| ApiError::internal(e.to_string()))?
        .filter(|attempt| attempt.flow == CodeFlow::SignUp)
        .filter(|attempt| attempt.expires_at >= Utc::now());

    attempt.ok_or_else(|| ApiError::not_found(kind::SIGNUP_KEY_NOT_FOUND, "Sign up key not found"))
}

fn validate_signup(req: &SignUpRequest) -> Result<(), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request(
            kind::VALIDATION_FAILED,
            "name is required",
        ));
    }
    let username_ok = (3..=30).contains(&req.username.len())
        && req
            .username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !username_ok {
        return Err(ApiError::bad_request(
            kind::VALIDATION_FAILED,
            "username must be 3-30 characters of [a-z0-9_]",
        ));
    }
    Ok(())
}
