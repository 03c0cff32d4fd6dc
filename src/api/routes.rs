use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::idempotency::idempotency;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Mutating routes -- at most one execution per Idempotency-Key
    let protected_routes = Router::new()
        .route(
            "/v1.0/signup/send-phone-code",
            post(handlers::send_signup_code),
        )
        .route("/v1.0/signup/verify-code", post(handlers::verify_code))
        .route("/v1.0/signup", post(handlers::signup))
        .route(
            "/v1.0/signin/send-phone-code",
            post(handlers::send_signin_code),
        )
        .route("/v1.0/signin", post(handlers::signin))
        .route("/v1.0/refresh-token", post(handlers::refresh_token))
        .route("/v1.0/signout", post(handlers::signout))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            idempotency,
        ));

    // Read routes -- no side effects, never protected
    let read_routes = Router::new().route("/v1.0/health", get(handlers::health));

    Router::new()
        .merge(protected_routes)
        .merge(read_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
