use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account. Phone numbers and usernames are unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub created_at: DateTime<Utc>,
    pub id: String,
    pub name: String,
    pub phone: String,
    pub username: String,
}

/// Which flow a verification code belongs to. A phone can have one live
/// attempt per flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeFlow {
    SignIn,
    SignUp,
}

impl CodeFlow {
    pub fn as_str(self) -> &'static str {
        match self {
            CodeFlow::SignIn => "signin",
            CodeFlow::SignUp => "signup",
        }
    }
}

/// A pending phone verification: the code that was sent and the opaque key
/// the client uses to refer back to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeAttempt {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub flow: CodeFlow,
    pub key: String,
    /// When the code was last (re)sent; drives the send-frequency limit.
    pub last_request: DateTime<Utc>,
    pub phone: String,
    /// Set for sign-in attempts, where the account already exists.
    pub user_id: Option<String>,
    /// Sign-up only: set once the client has proven the code.
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// An opaque bearer token. Refresh tokens are single-use: rotation revokes
/// the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub kind: TokenKind,
    pub token: String,
    pub user_id: String,
}

/// Persisted form of a captured response. Only the idempotency subsystem
/// reads what it writes; headers are kept as raw byte pairs so non-UTF-8
/// values survive the round trip, and the stored record is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub body: Vec<u8>,
    pub captured_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub headers: Vec<(String, Vec<u8>)>,
    pub status: u16,
}
