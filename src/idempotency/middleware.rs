//! Idempotent execution of mutating endpoints.
//!
//! Protocol per request: check the replay cache, take the per-key lock,
//! re-check the cache, run the inner handler, capture its response, cache it
//! when eligible, release the lock. For a given key the handler runs at most
//! once while a cached response exists, and every request bearing that key
//! receives the same bytes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, warn};

use super::capture::{tee, CaptureOutcome, CapturedResponse};
use crate::api::response::{kind, JSendError, JSendFail};
use crate::config::MissingKeyPolicy;
use crate::AppState;

/// Clients supply this header on every protected mutating request.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// How many times a failed cache write is retried. The response has already
/// been committed to the caller by then, so the last failure is logged and
/// swallowed; a retry with the same key will re-execute until the store
/// recovers.
const STORE_ATTEMPTS: u32 = 3;

pub async fn idempotency(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.config.idempotency.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let key = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned);

    let Some(key) = key else {
        return match state.config.idempotency.missing_key_policy {
            MissingKeyPolicy::Reject => missing_key(),
            MissingKeyPolicy::Passthrough => next.run(request).await,
        };
    };

    if let Some(cached) = state.replay.get(&key) {
        debug!(key = %key, "replaying cached response");
        return cached.into_response();
    }

    // Held until this function returns, on every path out of it
    let _slot = state.key_lock.lock(&key).await;

    // Second look, now under the lock: a concurrent request with the same key
    // may have executed and stored while we were waiting.
    if let Some(cached) = state.replay.get(&key) {
        debug!(key = %key, "replaying response stored by a concurrent request");
        return cached.into_response();
    }

    let response = next.run(request).await;

    match tee(response, state.config.idempotency.max_body_bytes).await {
        Ok(CaptureOutcome::Captured(response, captured)) => {
            if cacheable(&captured) {
                store_captured(&state, &key, &captured);
            }
            response
        }
        Ok(CaptureOutcome::Overflow(response)) => {
            warn!(key = %key, "response exceeded the capture limit, not cached");
            response
        }
        Err(e) => {
            error!(key = %key, error = %e, "reading the response body failed");
            JSendError::internal("Internal Server Error").into_response()
        }
    }
}

/// Server faults are never replayed; the client should retry those for real.
fn cacheable(response: &CapturedResponse) -> bool {
    response.status.as_u16() < 500
}

fn store_captured(state: &AppState, key: &str, captured: &CapturedResponse) {
    for attempt in 1..=STORE_ATTEMPTS {
        match state.replay.store(key, captured) {
            Ok(()) => return,
            Err(e) if attempt == STORE_ATTEMPTS => {
                warn!(key = %key, error = %e, "caching the captured response failed");
            }
            Err(e) => {
                debug!(key = %key, attempt, error = %e, "caching the captured response failed, retrying");
            }
        }
    }
}

fn missing_key() -> Response {
    JSendFail::response(
        StatusCode::BAD_REQUEST,
        kind::IDEMPOTENCY_KEY_MISSING,
        format!("No \"{IDEMPOTENCY_KEY_HEADER}\" header provided"),
    )
    .into_response()
}
