use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::response::{kind, ApiError, AppJson, JSend};
use crate::storage::models::CodeFlow;
use crate::tokens::pair;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct SignInRequest {
    pub code: String,
    pub signin_key: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignInResponse {
    pub access_token: String,
    pub refresh_token: String,
}

// ============================================================================
// Handler
// ============================================================================

pub async fn signin(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SignInRequest>,
) -> Result<Json<JSend<SignInResponse>>, ApiError> {
    let attempt = state
        .db
        .get_code_attempt(&req.signin_key.to_string())
        .map_err(|e| ApiError::internal(e.to_string()))?
        .filter(|attempt| attempt.flow == CodeFlow::SignIn)
        .filter(|attempt| attempt.expires_at >= Utc::now())
        .ok_or_else(|| ApiError::not_found(kind::SIGNIN_KEY_NOT_FOUND, "Sign in key not found"))?;

    if attempt.code != req.code {
        return Err(ApiError::bad_request(
            kind::WRONG_CODE,
            "Wrong phone verification code",
        ));
    }

    // A sign-in attempt always references the existing account
    let user_id = attempt
        .user_id
        .clone()
        .ok_or_else(|| ApiError::internal("Sign-in attempt has no user"))?;

    // The code is single-use
    state
        .db
        .delete_code_attempt(&attempt.key)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let tokens = pair::issue(&state.db, &state.config.tokens, &user_id)
        .map_err(|e| ApiError::internal(format!("Failed to issue tokens: {e}")))?;

    tracing::debug!(user_id = %user_id, "Signed in");

    Ok(JSend::success(SignInResponse {
        access_token: tokens.access.token,
        refresh_token: tokens.refresh.token,
    }))
}
