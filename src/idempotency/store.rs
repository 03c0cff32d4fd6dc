//! Durable, TTL-bounded storage of captured responses.

use std::sync::Arc;

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::capture::CapturedResponse;
use crate::storage::models::ReplayRecord;
use crate::storage::{Database, DatabaseError};

/// Backend seam for the replay cache: any durable key-value store that can
/// fetch and put records. The embedded database implements it; tests plug in
/// in-memory and failing doubles.
pub trait ReplayBackend: Send + Sync {
    fn fetch(&self, key: &str) -> Result<Option<ReplayRecord>, DatabaseError>;
    fn put(&self, key: &str, record: &ReplayRecord) -> Result<(), DatabaseError>;
}

impl ReplayBackend for Database {
    fn fetch(&self, key: &str) -> Result<Option<ReplayRecord>, DatabaseError> {
        self.get_replay(key)
    }

    fn put(&self, key: &str, record: &ReplayRecord) -> Result<(), DatabaseError> {
        self.put_replay(key, record)
    }
}

/// Key -> captured-response cache with per-entry expiration.
///
/// Lookups never fail the request: backend faults and undecodable records
/// degrade to a miss, so the protected endpoint re-executes instead of
/// erroring. Writes are the caller's policy decision and return the error.
#[derive(Clone)]
pub struct ReplayStore {
    backend: Arc<dyn ReplayBackend>,
    ttl: Duration,
}

impl ReplayStore {
    pub fn new(backend: Arc<dyn ReplayBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Look up the captured response for `key`.
    pub fn get(&self, key: &str) -> Option<CapturedResponse> {
        let record = match self.backend.fetch(key) {
            Ok(found) => found?,
            Err(DatabaseError::Serialization(e)) => {
                warn!(key = %key, error = %e, "replay cache: discarding undecodable record");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "replay cache: lookup failed, treating as miss");
                return None;
            }
        };

        // Expired but not yet purged by the cleaner
        if record.expires_at < Utc::now() {
            return None;
        }

        match decode(record) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(key = %key, error = %e, "replay cache: discarding corrupt record");
                None
            }
        }
    }

    /// Persist `response` under `key` until the TTL elapses.
    ///
    /// The record is stored verbatim; eligibility (the sub-500 status policy)
    /// is decided by the caller.
    pub fn store(&self, key: &str, response: &CapturedResponse) -> Result<(), DatabaseError> {
        let record = encode(response, Utc::now() + self.ttl);
        self.backend.put(key, &record)
    }
}

fn encode(response: &CapturedResponse, expires_at: DateTime<Utc>) -> ReplayRecord {
    let headers = response
        .headers
        .iter()
        .map(|(name, value)| (name.as_str().to_owned(), value.as_bytes().to_vec()))
        .collect();

    ReplayRecord {
        body: response.body.to_vec(),
        captured_at: response.captured_at,
        expires_at,
        headers,
        status: response.status.as_u16(),
    }
}

fn decode(record: ReplayRecord) -> Result<CapturedResponse, axum::http::Error> {
    let status = StatusCode::from_u16(record.status)?;

    let mut headers = HeaderMap::with_capacity(record.headers.len());
    for (name, value) in &record.headers {
        headers.append(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_bytes(value)?,
        );
    }

    Ok(CapturedResponse {
        body: record.body.into(),
        captured_at: record.captured_at,
        headers,
        status,
    })
}
