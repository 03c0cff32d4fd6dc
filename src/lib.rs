//! identity-gate - A phone-based identity service with idempotent mutation
//! endpoints
//!
//! This crate provides sign-up, sign-in, token refresh and sign-out over
//! SMS-verified phone numbers, with:
//! - At-most-once execution of mutating endpoints, keyed by a client-supplied
//!   `Idempotency-Key` header, with byte-exact replay of the first response
//! - A per-key striped lock that reclaims idle keys automatically
//! - A TTL-bounded replay cache over an embedded redb store
//! - Opaque access/refresh token pairs with single-use refresh rotation
//! - Active expiration via background tasks
//! - REST API

pub mod api;
pub mod config;
pub mod expiration;
pub mod idempotency;
pub mod sms;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use std::sync::Arc;

use config::Config;
use idempotency::{KeyLock, ReplayStore};
use sms::SmsSender;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub key_lock: KeyLock,
    pub replay: ReplayStore,
    pub sms: Arc<dyn SmsSender>,
}
