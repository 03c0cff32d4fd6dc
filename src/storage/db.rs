use chrono::{DateTime, Utc};
use redb::{Database as RedbDatabase, ReadableTable};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::models::{AuthToken, CodeAttempt, CodeFlow, ReplayRecord, User};
use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Redb(#[from] redb::Error),
    #[error("Database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
}

#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("identity-gate.redb");
        let db = RedbDatabase::create(db_path)?;

        // Create tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(PHONE_USERS)?;
            let _ = write_txn.open_table(USERNAME_USERS)?;
            let _ = write_txn.open_table(CODE_ATTEMPTS)?;
            let _ = write_txn.open_table(PHONE_ATTEMPTS)?;
            let _ = write_txn.open_table(AUTH_TOKENS)?;
            let _ = write_txn.open_table(REPLAY_CACHE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========================================================================
    // User operations
    // ========================================================================

    /// Store a user and maintain the phone and username indexes
    pub fn put_user(&self, user: &User) -> Result<(), DatabaseError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            let data = bincode::serialize(user)?;
            table.insert(user.id.as_str(), data.as_slice())?;

            let mut phone_index = write_txn.open_table(PHONE_USERS)?;
            phone_index.insert(user.phone.as_str(), user.id.as_str())?;

            let mut username_index = write_txn.open_table(USERNAME_USERS)?;
            username_index.insert(user.username.as_str(), user.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a user by ID
    pub fn get_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        match table.get(user_id)? {
            Some(data) => {
                let user: User = bincode::deserialize(data.value())?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Get a user by phone number
    pub fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PHONE_USERS)?;

        let user_id: Option<String> = index.get(phone)?.map(|v| v.value().to_string());
        drop(index);

        match user_id {
            Some(id) => {
                let table = read_txn.open_table(USERS)?;
                match table.get(id.as_str())? {
                    Some(data) => Ok(Some(bincode::deserialize(data.value())?)),
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    /// Check whether a username is taken
    pub fn username_exists(&self, username: &str) -> Result<bool, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USERNAME_USERS)?;
        Ok(index.get(username)?.is_some())
    }

    // ========================================================================
    // Code attempt operations
    // ========================================================================

    /// Store a verification attempt. A phone has at most one live attempt per
    /// flow: a previous attempt for the same flow and phone is replaced.
    pub fn put_code_attempt(&self, attempt: &CodeAttempt) -> Result<(), DatabaseError> {
        let index_key = phone_attempt_key(attempt.flow, &attempt.phone);
        let write_txn = self.db.begin_write()?;
        {
            // Drop the superseded attempt, if any
            let previous_key: Option<String> = {
                let index = write_txn.open_table(PHONE_ATTEMPTS)?;
                let previous = index.get(index_key.as_str())?.map(|v| v.value().to_string());
                previous
            };
            if let Some(previous) = previous_key {
                if previous != attempt.key {
                    let mut table = write_txn.open_table(CODE_ATTEMPTS)?;
                    table.remove(previous.as_str())?;
                }
            }

            let mut table = write_txn.open_table(CODE_ATTEMPTS)?;
            let data = bincode::serialize(attempt)?;
            table.insert(attempt.key.as_str(), data.as_slice())?;

            let mut index = write_txn.open_table(PHONE_ATTEMPTS)?;
            index.insert(index_key.as_str(), attempt.key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a verification attempt by its key
    pub fn get_code_attempt(&self, key: &str) -> Result<Option<CodeAttempt>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CODE_ATTEMPTS)?;

        match table.get(key)? {
            Some(data) => {
                let attempt: CodeAttempt = bincode::deserialize(data.value())?;
                Ok(Some(attempt))
            }
            None => Ok(None),
        }
    }

    /// Get the live attempt for a flow and phone, if any
    pub fn get_attempt_by_phone(
        &self,
        flow: CodeFlow,
        phone: &str,
    ) -> Result<Option<CodeAttempt>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PHONE_ATTEMPTS)?;

        let key: Option<String> = index
            .get(phone_attempt_key(flow, phone).as_str())?
            .map(|v| v.value().to_string());
        drop(index);

        match key {
            Some(key) => {
                let table = read_txn.open_table(CODE_ATTEMPTS)?;
                match table.get(key.as_str())? {
                    Some(data) => Ok(Some(bincode::deserialize(data.value())?)),
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    /// Delete a verification attempt and its index entry
    pub fn delete_code_attempt(&self, key: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.db.begin_write()?;

        let index_key: Option<String> = {
            let table = write_txn.open_table(CODE_ATTEMPTS)?;
            let found = match table.get(key)? {
                Some(data) => {
                    let attempt: CodeAttempt = bincode::deserialize(data.value())?;
                    Some(phone_attempt_key(attempt.flow, &attempt.phone))
                }
                None => None,
            };
            found
        };

        let deleted = match index_key {
            Some(index_key) => {
                {
                    let mut table = write_txn.open_table(CODE_ATTEMPTS)?;
                    table.remove(key)?;
                }
                let stale = {
                    let index = write_txn.open_table(PHONE_ATTEMPTS)?;
                    let is_stale = index
                        .get(index_key.as_str())?
                        .map(|v| v.value() == key)
                        .unwrap_or(false);
                    is_stale
                };
                if stale {
                    let mut index = write_txn.open_table(PHONE_ATTEMPTS)?;
                    index.remove(index_key.as_str())?;
                }
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    // ========================================================================
    // Auth token operations
    // ========================================================================

    /// Store an access or refresh token
    pub fn put_auth_token(&self, token: &AuthToken) -> Result<(), DatabaseError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUTH_TOKENS)?;
            let data = bincode::serialize(token)?;
            table.insert(token.token.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a token by its opaque value
    pub fn get_auth_token(&self, token: &str) -> Result<Option<AuthToken>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUTH_TOKENS)?;

        match table.get(token)? {
            Some(data) => {
                let token: AuthToken = bincode::deserialize(data.value())?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    /// Delete a token. Returns false if it was not present.
    pub fn delete_auth_token(&self, token: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(AUTH_TOKENS)?;
            let removed = table.remove(token)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(deleted)
    }

    // ========================================================================
    // Replay cache operations
    // ========================================================================

    /// Store a captured response under an idempotency key
    pub fn put_replay(&self, key: &str, record: &ReplayRecord) -> Result<(), DatabaseError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(REPLAY_CACHE)?;
            let data = bincode::serialize(record)?;
            table.insert(key, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get the captured response for an idempotency key
    pub fn get_replay(&self, key: &str) -> Result<Option<ReplayRecord>, DatabaseError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REPLAY_CACHE)?;

        match table.get(key)? {
            Some(data) => {
                let record: ReplayRecord = bincode::deserialize(data.value())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Insert raw bytes under an idempotency key, bypassing serialization
    #[cfg(test)]
    pub fn put_replay_raw(&self, key: &str, data: &[u8]) -> Result<(), DatabaseError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(REPLAY_CACHE)?;
            table.insert(key, data)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // ========================================================================
    // Expiration cleanup
    // ========================================================================

    /// Remove expired (or undecodable) replay records
    pub fn purge_expired_replays(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let mut purged = 0u64;
        {
            let table = write_txn.open_table(REPLAY_CACHE)?;
            let mut expired: Vec<String> = Vec::new();
            for result in table.iter()? {
                let (key, value) = result?;
                match bincode::deserialize::<ReplayRecord>(value.value()) {
                    Ok(record) if record.expires_at >= now => {}
                    _ => expired.push(key.value().to_string()),
                }
            }
            drop(table);

            let mut table = write_txn.open_table(REPLAY_CACHE)?;
            for key in expired {
                table.remove(key.as_str())?;
                purged += 1;
            }
        }
        write_txn.commit()?;
        Ok(purged)
    }

    /// Remove expired verification attempts and their index entries
    pub fn purge_expired_attempts(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let mut purged = 0u64;
        {
            let table = write_txn.open_table(CODE_ATTEMPTS)?;
            let mut expired: Vec<(String, String)> = Vec::new();
            for result in table.iter()? {
                let (key, value) = result?;
                let attempt: CodeAttempt = bincode::deserialize(value.value())?;
                if attempt.expires_at < now {
                    expired.push((
                        key.value().to_string(),
                        phone_attempt_key(attempt.flow, &attempt.phone),
                    ));
                }
            }
            drop(table);

            let mut table = write_txn.open_table(CODE_ATTEMPTS)?;
            let mut index = write_txn.open_table(PHONE_ATTEMPTS)?;
            for (key, index_key) in expired {
                table.remove(key.as_str())?;
                let stale = index
                    .get(index_key.as_str())?
                    .map(|v| v.value() == key)
                    .unwrap_or(false);
                if stale {
                    index.remove(index_key.as_str())?;
                }
                purged += 1;
            }
        }
        write_txn.commit()?;
        Ok(purged)
    }

    /// Remove expired access and refresh tokens
    pub fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let write_txn = self.db.begin_write()?;
        let mut purged = 0u64;
        {
            let table = write_txn.open_table(AUTH_TOKENS)?;
            let mut expired: Vec<String> = Vec::new();
            for result in table.iter()? {
                let (key, value) = result?;
                let token: AuthToken = bincode::deserialize(value.value())?;
                if token.expires_at < now {
                    expired.push(key.value().to_string());
                }
            }
            drop(table);

            let mut table = write_txn.open_table(AUTH_TOKENS)?;
            for key in expired {
                table.remove(key.as_str())?;
                purged += 1;
            }
        }
        write_txn.commit()?;
        Ok(purged)
    }
}

fn phone_attempt_key(flow: CodeFlow, phone: &str) -> String {
    format!("{}:{}", flow.as_str(), phone)
}
