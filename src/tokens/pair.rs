//! Opaque access/refresh token pairs.
//!
//! Tokens are random values stored server-side; there is nothing to verify
//! offline. Refresh tokens are single-use: a rotation revokes the old token
//! before issuing the next pair.

use chrono::{Duration, Utc};
use thiserror::Error;

use super::generator::generate_hex;
use crate::config::TokenConfig;
use crate::storage::models::{AuthToken, TokenKind};
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: AuthToken,
    pub refresh: AuthToken,
}

#[derive(Debug, Error)]
pub enum RotateError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("refresh token expired")]
    Expired,
    #[error("refresh token is unknown or not a refresh token")]
    Invalid,
}

/// Issue a fresh access/refresh pair for a user
pub fn issue(
    db: &Database,
    config: &TokenConfig,
    user_id: &str,
) -> Result<TokenPair, DatabaseError> {
    let now = Utc::now();

    let access = AuthToken {
        expires_at: now + Duration::seconds(config.access_ttl_seconds as i64),
        issued_at: now,
        kind: TokenKind::Access,
        token: generate_hex(32),
        user_id: user_id.to_owned(),
    };
    let refresh = AuthToken {
        expires_at: now + Duration::seconds(config.refresh_ttl_seconds as i64),
        issued_at: now,
        kind: TokenKind::Refresh,
        token: generate_hex(32),
        user_id: user_id.to_owned(),
    };

    db.put_auth_token(&access)?;
    db.put_auth_token(&refresh)?;

    Ok(TokenPair { access, refresh })
}

/// Exchange a refresh token for a fresh pair, revoking the old token
pub fn rotate(db: &Database, config: &TokenConfig, token: &str) -> Result<TokenPair, RotateError> {
    let Some(stored) = db.get_auth_token(token)? else {
        return Err(RotateError::Invalid);
    };
    if stored.kind != TokenKind::Refresh {
        return Err(RotateError::Invalid);
    }
    if stored.expires_at < Utc::now() {
        db.delete_auth_token(token)?;
        return Err(RotateError::Expired);
    }

    db.delete_auth_token(token)?;
    Ok(issue(db, config, &stored.user_id)?)
}

/// Revoke a refresh token. Unknown tokens are fine: signing out twice is not
/// an error.
pub fn revoke(db: &Database, token: &str) -> Result<bool, DatabaseError> {
    db.delete_auth_token(token)
}
