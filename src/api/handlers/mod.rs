mod phone;
mod session;
mod signin;
mod signup;

pub use phone::{send_signin_code, send_signup_code};
pub use session::{refresh_token, signout};
pub use signin::signin;
pub use signup::{signup, verify_code};

use axum::Json;
use serde::Serialize;

use crate::api::response::{kind, ApiError, JSend};

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Shared validation
// ============================================================================

/// Accepts E.164-shaped phone numbers: optional leading '+', 7-15 digits.
pub(crate) fn validate_phone(phone: &str) -> Result<(), ApiError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let well_formed =
        (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
    if !well_formed {
        return Err(ApiError::bad_request(
            kind::VALIDATION_FAILED,
            "phone must be in E.164 format",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_phone;

    #[test]
    fn phone_validation() {
        assert!(validate_phone("+79991234567").is_ok());
        assert!(validate_phone("79991234567").is_ok());
        assert!(validate_phone("+123").is_err());
        assert!(validate_phone("+7999123456789012").is_err());
        assert!(validate_phone("+7999abc4567").is_err());
        assert!(validate_phone("").is_err());
    }
}
