//! Shared test helpers — available to all `#[cfg(test)]` modules in the crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tempfile::TempDir;

use crate::config::{CodeConfig, Config, IdempotencyConfig, NodeConfig, TokenConfig};
use crate::idempotency::{KeyLock, ReplayBackend, ReplayStore};
use crate::sms::{SmsError, SmsSender};
use crate::storage::models::{AuthToken, CodeAttempt, CodeFlow, ReplayRecord, TokenKind, User};
use crate::storage::{Database, DatabaseError};
use crate::AppState;

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard — the caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A minimal `Config` suitable for unit tests.
pub fn test_config() -> Config {
    Config {
        codes: CodeConfig::default(),
        idempotency: IdempotencyConfig::default(),
        node: NodeConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: "/tmp/test".to_string(),
        },
        tokens: TokenConfig::default(),
    }
}

/// Build a full `Arc<AppState>` around the given database, with the database
/// itself as the replay backend and a recording SMS stub.
pub fn test_state(db: Database) -> Arc<AppState> {
    let backend = Arc::new(db.clone());
    test_state_with(db, backend)
}

/// Like [`test_state`] but with an explicit replay backend.
pub fn test_state_with(db: Database, backend: Arc<dyn ReplayBackend>) -> Arc<AppState> {
    let config = test_config();
    let replay = ReplayStore::new(backend, Duration::seconds(config.idempotency.ttl_seconds as i64));
    Arc::new(AppState {
        config,
        db,
        key_lock: KeyLock::new(),
        replay,
        sms: Arc::new(RecordingSms::default()),
    })
}

/// Create a `User` with the given id, phone and username.
pub fn make_user(id: &str, phone: &str, username: &str) -> User {
    User {
        created_at: Utc::now(),
        id: id.to_string(),
        name: format!("Name {id}"),
        phone: phone.to_string(),
        username: username.to_string(),
    }
}

/// Create an unverified `CodeAttempt` expiring in 10 minutes.
pub fn make_attempt(key: &str, flow: CodeFlow, phone: &str) -> CodeAttempt {
    let now = Utc::now();
    CodeAttempt {
        code: "123456".to_string(),
        created_at: now,
        expires_at: now + Duration::minutes(10),
        flow,
        key: key.to_string(),
        last_request: now,
        phone: phone.to_string(),
        user_id: None,
        verified: false,
    }
}

/// Create an `AuthToken` expiring `ttl` from now (negative for expired).
pub fn make_token(token: &str, kind: TokenKind, user_id: &str, ttl: Duration) -> AuthToken {
    let now = Utc::now();
    AuthToken {
        expires_at: now + ttl,
        issued_at: now,
        kind,
        token: token.to_string(),
        user_id: user_id.to_string(),
    }
}

// ============================================================================
// Test doubles
// ============================================================================

/// SMS sender that records every message instead of delivering.
#[derive(Debug, Default)]
pub struct RecordingSms {
    pub sent: Mutex<Vec<(String, String)>>,
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

/// In-memory replay backend.
#[derive(Debug, Default)]
pub struct MemoryReplayBackend {
    records: Mutex<HashMap<String, ReplayRecord>>,
}

impl MemoryReplayBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayBackend for MemoryReplayBackend {
    fn fetch(&self, key: &str) -> Result<Option<ReplayRecord>, DatabaseError> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, record: &ReplayRecord) -> Result<(), DatabaseError> {
        self.records
            .lock()
            .unwrap()
            .insert(key.to_string(), record.clone());
        Ok(())
    }
}

/// Replay backend whose fetch and/or put side always fails.
#[derive(Debug, Default)]
pub struct FailingReplayBackend {
    fail_fetch: bool,
    fail_put: bool,
    inner: MemoryReplayBackend,
}

impl FailingReplayBackend {
    pub fn failing_fetch() -> Self {
        Self {
            fail_fetch: true,
            ..Self::default()
        }
    }

    pub fn failing_put() -> Self {
        Self {
            fail_put: true,
            ..Self::default()
        }
    }
}

impl ReplayBackend for FailingReplayBackend {
    fn fetch(&self, key: &str) -> Result<Option<ReplayRecord>, DatabaseError> {
        if self.fail_fetch {
            return Err(std::io::Error::other("replay backend down").into());
        }
        self.inner.fetch(key)
    }

    fn put(&self, key: &str, record: &ReplayRecord) -> Result<(), DatabaseError> {
        if self.fail_put {
            return Err(std::io::Error::other("replay backend down").into());
        }
        self.inner.put(key, record)
    }
}
