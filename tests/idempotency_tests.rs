//! End-to-end tests of the idempotency coordination subsystem.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{middleware, Router};
use chrono::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use identity_gate::api::create_router;
use identity_gate::config::{CodeConfig, Config, IdempotencyConfig, NodeConfig, TokenConfig};
use identity_gate::idempotency::{idempotency, KeyLock, ReplayStore, IDEMPOTENCY_KEY_HEADER};
use identity_gate::sms::{SmsError, SmsSender};
use identity_gate::storage::models::ReplayRecord;
use identity_gate::storage::Database;
use identity_gate::AppState;

#[derive(Debug, Default)]
struct RecordingSms {
    sent: Mutex<Vec<(String, String)>>,
}

impl SmsSender for RecordingSms {
    fn send(&self, phone: &str, message: &str) -> Result<(), SmsError> {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

fn setup_state() -> (Arc<AppState>, Arc<RecordingSms>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();

    let config = Config {
        codes: CodeConfig::default(),
        idempotency: IdempotencyConfig::default(),
        node: NodeConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: temp_dir.path().display().to_string(),
        },
        tokens: TokenConfig::default(),
    };

    let sms = Arc::new(RecordingSms::default());
    let replay = ReplayStore::new(
        Arc::new(db.clone()),
        Duration::seconds(config.idempotency.ttl_seconds as i64),
    );
    let state = Arc::new(AppState {
        config,
        db,
        key_lock: KeyLock::new(),
        replay,
        sms: Arc::clone(&sms) as Arc<dyn SmsSender>,
    });

    (state, sms, temp_dir)
}

fn send_code_request(key: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1.0/signup/send-phone-code")
        .header("content-type", "application/json")
        .header(IDEMPOTENCY_KEY_HEADER, key)
        .body(Body::from(r#"{"phone":"+79991234567"}"#))
        .unwrap()
}

#[tokio::test]
async fn repeated_send_code_replays_and_sends_one_sms() {
    let (state, sms, _temp) = setup_state();
    let app = create_router(state);

    let first = app.clone().oneshot(send_code_request("K1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = to_bytes(first.into_body(), usize::MAX).await.unwrap();

    // Without replay this second request would trip the send-frequency limit
    let second = app.clone().oneshot(send_code_request("K1")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = to_bytes(second.into_body(), usize::MAX).await.unwrap();

    assert_eq!(first_body, second_body);
    assert_eq!(sms.sent.lock().unwrap().len(), 1);

    let value: serde_json::Value = serde_json::from_slice(&first_body).unwrap();
    assert!(value["data"]["signup_key"].is_string());
}

#[tokio::test]
async fn missing_key_on_a_protected_route_is_rejected() {
    let (state, sms, _temp) = setup_state();
    let app = create_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1.0/signup/send-phone-code")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"phone":"+79991234567"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["data"]["kind"], "idempotency_key_missing");
    assert!(sms.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn health_route_needs_no_key() {
    let (state, _sms, _temp) = setup_state();
    let app = create_router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/v1.0/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_concurrent_requests_observe_one_execution() {
    let (state, _sms, _temp) = setup_state();
    let lock_watch = Arc::clone(&state);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let app = Router::new()
        .route(
            "/op",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    uuid::Uuid::new_v4().to_string()
                }
            }),
        )
        .layer(middleware::from_fn_with_state(state, idempotency));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let request = Request::builder()
                .method("POST")
                .uri("/op")
                .header(IDEMPOTENCY_KEY_HEADER, "K2")
                .body(Body::empty())
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            to_bytes(response.into_body(), usize::MAX).await.unwrap()
        }));
    }

    let mut bodies = Vec::new();
    for handle in handles {
        bodies.push(handle.await.unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));

    // Nothing left behind in the lock registry
    assert_eq!(lock_watch.key_lock.contended(), 0);
}

#[tokio::test]
async fn expired_cache_entry_causes_re_execution() {
    let (state, sms, _temp) = setup_state();

    // Plant an already-expired record under the key the client will use
    let now = chrono::Utc::now();
    state
        .db
        .put_replay(
            "K4",
            &ReplayRecord {
                body: b"stale".to_vec(),
                captured_at: now - Duration::hours(2),
                expires_at: now - Duration::hours(1),
                headers: vec![],
                status: 200,
            },
        )
        .unwrap();

    let app = create_router(state);
    let response = app.oneshot(send_code_request("K4")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(value["data"]["signup_key"].is_string());
    assert_eq!(sms.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn distinct_keys_execute_independently() {
    let (state, sms, _temp) = setup_state();

    // Separate phones so the frequency limit does not interfere
    let app = create_router(state);
    for (key, phone) in [("K5", "+79991230001"), ("K6", "+79991230002")] {
        let request = Request::builder()
            .method("POST")
            .uri("/v1.0/signup/send-phone-code")
            .header("content-type", "application/json")
            .header(IDEMPOTENCY_KEY_HEADER, key)
            .body(Body::from(format!(r#"{{"phone":"{phone}"}}"#)))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(sms.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn client_errors_are_replayed_within_ttl() {
    let (state, _sms, _temp) = setup_state();
    let app = create_router(state);

    // Unknown phone: sign-in send-code fails with a 404 the first time
    let request = |key: &str| {
        Request::builder()
            .method("POST")
            .uri("/v1.0/signin/send-phone-code")
            .header("content-type", "application/json")
            .header(IDEMPOTENCY_KEY_HEADER, key)
            .body(Body::from(r#"{"phone":"+79991234567"}"#))
            .unwrap()
    };

    let first = app.clone().oneshot(request("K7")).await.unwrap();
    assert_eq!(first.status(), StatusCode::NOT_FOUND);
    let first_body = to_bytes(first.into_body(), usize::MAX).await.unwrap();

    // The failure is replayed, not recomputed
    let second = app.oneshot(request("K7")).await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    let second_body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
    assert_eq!(first_body, second_body);
}
