use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Machine-readable error kinds, part of the public API contract.
pub mod kind {
    pub const IDEMPOTENCY_KEY_MISSING: &str = "idempotency_key_missing";
    pub const INVALID_JSON: &str = "invalid_json";
    pub const REFRESH_TOKEN_EXPIRED: &str = "refresh_token_expired";
    pub const REFRESH_TOKEN_INVALID: &str = "refresh_token_invalid";
    pub const SEND_CODE_FREQ_EXCEEDED: &str = "send_code_freq_exceeded";
    pub const SIGNIN_KEY_NOT_FOUND: &str = "signin_key_not_found";
    pub const SIGNUP_KEY_NOT_FOUND: &str = "signup_key_not_found";
    pub const SIGNUP_NOT_VERIFIED: &str = "signup_not_verified";
    pub const USERNAME_ALREADY_EXISTS: &str = "username_already_exists";
    pub const USER_ALREADY_EXISTS: &str = "user_already_exists";
    pub const USER_NOT_FOUND: &str = "user_not_found";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const WRONG_CODE: &str = "wrong_code";
}

// ============================================================================
// JSend status enum
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
    Success,
}

// ============================================================================
// JSend success envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSend<T: Serialize> {
    pub data: T,
    pub status: JSendStatus,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend {
            data,
            status: JSendStatus::Success,
        })
    }
}

// ============================================================================
// JSend fail envelope (client errors, 4xx)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSendFail {
    pub data: FailData,
    pub status: JSendStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailData {
    /// One of the [`kind`] constants.
    pub kind: String,
    pub message: String,
}

impl JSendFail {
    pub fn response(
        status_code: StatusCode,
        kind: &str,
        message: impl Into<String>,
    ) -> (StatusCode, Json<JSendFail>) {
        (
            status_code,
            Json(JSendFail {
                data: FailData {
                    kind: kind.to_owned(),
                    message: message.into(),
                },
                status: JSendStatus::Fail,
            }),
        )
    }
}

// ============================================================================
// JSend error envelope (server errors, 5xx)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSendError {
    pub message: String,
    pub status: JSendStatus,
}

impl JSendError {
    pub fn response(
        status_code: StatusCode,
        message: impl Into<String>,
    ) -> (StatusCode, Json<JSendError>) {
        (
            status_code,
            Json(JSendError {
                message: message.into(),
                status: JSendStatus::Error,
            }),
        )
    }

    pub fn internal(message: impl Into<String>) -> (StatusCode, Json<JSendError>) {
        Self::response(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

// ============================================================================
// Unified error type for handlers
// ============================================================================

/// A JSend-compatible error that can be either a fail (4xx, with a
/// machine-readable kind) or an error (5xx). Used as the error type in
/// handler Result returns.
#[derive(Debug)]
pub enum ApiError {
    Fail(StatusCode, &'static str, String),
    Error(StatusCode, String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Fail(code, kind, msg) => {
                let (status, json) = JSendFail::response(code, kind, msg);
                (status, json).into_response()
            }
            ApiError::Error(code, msg) => {
                let (status, json) = JSendError::response(code, msg);
                (status, json).into_response()
            }
        }
    }
}

impl ApiError {
    pub fn bad_request(kind: &'static str, message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::BAD_REQUEST, kind, message.into())
    }

    pub fn unauthorized(kind: &'static str, message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::UNAUTHORIZED, kind, message.into())
    }

    pub fn not_found(kind: &'static str, message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::NOT_FOUND, kind, message.into())
    }

    pub fn conflict(kind: &'static str, message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::CONFLICT, kind, message.into())
    }

    pub fn too_many_requests(kind: &'static str, message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::TOO_MANY_REQUESTS, kind, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Fail(
            rejection.status(),
            kind::INVALID_JSON,
            rejection.body_text(),
        )
    }
}

/// JSON extractor that turns malformed bodies into a JSend fail instead of
/// axum's plain-text rejection.
#[derive(Debug, axum::extract::FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);
