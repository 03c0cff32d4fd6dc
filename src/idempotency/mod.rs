//! Idempotency-key coordination: at-most-once execution of protected
//! endpoints with byte-exact response replay.
//!
//! Pieces: [`KeyLock`] serializes concurrent requests per key, [`capture`]
//! records what a handler wrote, [`ReplayStore`] keeps captured responses
//! until their TTL elapses, and [`middleware::idempotency`] ties the
//! check/lock/recheck/execute/store protocol together.
//!
//! The lock is process-local. With several replicas behind one cache, two
//! replicas can both miss and both execute before either stores a result;
//! closing that gap needs a store-if-absent primitive at a shared backend.

pub mod capture;
pub mod key_lock;
pub mod middleware;
pub mod store;

pub use capture::{CaptureOutcome, CapturedResponse, ResponseCapturer};
pub use key_lock::{KeyLock, KeyLockGuard};
pub use middleware::{idempotency, IDEMPOTENCY_KEY_HEADER};
pub use store::{ReplayBackend, ReplayStore};
