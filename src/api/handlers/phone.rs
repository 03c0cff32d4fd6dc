use axum::extract::State;
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validate_phone;
use crate::api::response::{kind, ApiError, AppJson, JSend};
use crate::sms::render_code_message;
use crate::storage::models::{CodeAttempt, CodeFlow};
use crate::tokens::generator::generate_code;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct SendCodeRequest {
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendSignUpCodeResponse {
    pub signup_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendSignInCodeResponse {
    pub signin_key: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn send_signup_code(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SendCodeRequest>,
) -> Result<Json<JSend<SendSignUpCodeResponse>>, ApiError> {
    validate_phone(&req.phone)?;
    check_send_frequency(&state, CodeFlow::SignUp, &req.phone)?;

    let registered = state
        .db
        .get_user_by_phone(&req.phone)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .is_some();
    if registered {
        return Err(ApiError::conflict(
            kind::USER_ALREADY_EXISTS,
            "Phone is already registered",
        ));
    }

    let attempt = new_attempt(&state, CodeFlow::SignUp, &req.phone, None);
    deliver_and_store(&state, &attempt)?;

    tracing::debug!(signup_key = %attempt.key, "Created sign-up verification attempt");

    Ok(JSend::success(SendSignUpCodeResponse {
        signup_key: attempt.key,
    }))
}

pub async fn send_signin_code(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SendCodeRequest>,
) -> Result<Json<JSend<SendSignInCodeResponse>>, ApiError> {
    validate_phone(&req.phone)?;
    check_send_frequency(&state, CodeFlow::SignIn, &req.phone)?;

    let user = state
        .db
        .get_user_by_phone(&req.phone)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found(kind::USER_NOT_FOUND, "User not found"))?;

    let attempt = new_attempt(&state, CodeFlow::SignIn, &req.phone, Some(user.id));
    deliver_and_store(&state, &attempt)?;

    tracing::debug!(signin_key = %attempt.key, "Created sign-in verification attempt");

    Ok(JSend::success(SendSignInCodeResponse {
        signin_key: attempt.key,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn check_send_frequency(state: &AppState, flow: CodeFlow, phone: &str) -> Result<(), ApiError> {
    let previous = state
        .db
        .get_attempt_by_phone(flow, phone)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if let Some(previous) = previous {
        let next_allowed = previous.last_request
            + Duration::seconds(state.config.codes.send_frequency_seconds as i64);
        if next_allowed > Utc::now() {
            return Err(ApiError::too_many_requests(
                kind::SEND_CODE_FREQ_EXCEEDED,
                "Code was requested too recently for this phone",
            ));
        }
    }
    Ok(())
}

fn new_attempt(
    state: &AppState,
    flow: CodeFlow,
    phone: &str,
    user_id: Option<String>,
) -> CodeAttempt {
    let now = Utc::now();
    CodeAttempt {
        code: generate_code(),
        created_at: now,
        expires_at: now + Duration::seconds(state.config.codes.code_ttl_seconds as i64),
        flow,
        key: uuid::Uuid::new_v4().to_string(),
        last_request: now,
        phone: phone.to_string(),
        user_id,
        verified: false,
    }
}

/// Send the code first, store the attempt second: an attempt whose SMS never
/// went out must not block the next request on the frequency limit.
fn deliver_and_store(state: &AppState, attempt: &CodeAttempt) -> Result<(), ApiError> {
    state
        .sms
        .send(&attempt.phone, &render_code_message(&attempt.code))
        .map_err(|e| ApiError::internal(e.to_string()))?;

    state
        .db
        .put_code_attempt(attempt)
        .map_err(|e| ApiError::internal(format!("Failed to store attempt: {e}")))?;
    Ok(())
}
