use redb::TableDefinition;

/// Users: user_id -> User (bincode)
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Secondary index: phone -> user_id
pub const PHONE_USERS: TableDefinition<&str, &str> = TableDefinition::new("phone_users");

/// Secondary index: username -> user_id
pub const USERNAME_USERS: TableDefinition<&str, &str> = TableDefinition::new("username_users");

/// Phone verification attempts: attempt_key -> CodeAttempt (bincode)
pub const CODE_ATTEMPTS: TableDefinition<&str, &[u8]> = TableDefinition::new("code_attempts");

/// Secondary index: "{flow}:{phone}" -> attempt_key (one live attempt per flow and phone)
pub const PHONE_ATTEMPTS: TableDefinition<&str, &str> = TableDefinition::new("phone_attempts");

/// Access and refresh tokens: token -> AuthToken (bincode)
pub const AUTH_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("auth_tokens");

/// Captured idempotent responses: idempotency_key -> ReplayRecord (bincode)
pub const REPLAY_CACHE: TableDefinition<&str, &[u8]> = TableDefinition::new("replay_cache");
