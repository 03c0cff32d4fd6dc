use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{kind, ApiError, AppJson, JSend};
use crate::tokens::pair::{self, RotateError};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RefreshTokenRequest>,
) -> Result<Json<JSend<RefreshTokenResponse>>, ApiError> {
    let tokens = pair::rotate(&state.db, &state.config.tokens, &req.refresh_token).map_err(
        |e| match e {
            RotateError::Invalid => ApiError::unauthorized(
                kind::REFRESH_TOKEN_INVALID,
                "Refresh token is unknown or invalid",
            ),
            RotateError::Expired => {
                ApiError::unauthorized(kind::REFRESH_TOKEN_EXPIRED, "Refresh token expired")
            }
            RotateError::Database(e) => ApiError::internal(e.to_string()),
        },
    )?;

    tracing::debug!(user_id = %tokens.refresh.user_id, "Rotated refresh token");

    Ok(JSend::success(RefreshTokenResponse {
        access_token: tokens.access.token,
        refresh_token: tokens.refresh.token,
    }))
}

pub async fn signout(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RefreshTokenRequest>,
) -> Result<Json<JSend<()>>, ApiError> {
    // Unknown tokens succeed too: signing out twice must not error
    let revoked = pair::revoke(&state.db, &req.refresh_token)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if revoked {
        tracing::debug!("Revoked refresh token");
    }
    Ok(JSend::success(()))
}
