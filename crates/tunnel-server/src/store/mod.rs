//! Session Record Store.
//!
//! Maps a SessionID to its AccessKey and expiry metadata. Backends must
//! uphold one invariant: a record is never readable once `expires_at` has
//! passed, whether the backend evicted it on its own or the controller
//! deleted it.
//!
//! Sessions are independent keys; backends only need atomic per-key
//! operations. `touch` is best-effort and may lose updates under races.

mod memory;
mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::{migrate, SqliteSessionStore};

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use thiserror::Error;
use tunnel_crypto::{AccessKey, CryptoError};

/// Server-side record binding a session to its derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: String,
    pub access_key: AccessKey,
    pub last_used: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Fresh record created at key-exchange completion.
    pub fn new(session_id: String, access_key: AccessKey, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            session_id,
            access_key,
            last_used: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime, used as the store-level TTL at write time.
    pub fn ttl_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,

    /// The record exists but its lifetime has elapsed. It is never returned.
    #[error("session expired")]
    Expired,

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Keyed session storage with TTL eviction.
pub trait SessionStore: Send + Sync + 'static {
    /// Upsert `record` with a store-level TTL of `expires_at - now`.
    ///
    /// A record whose TTL already elapsed is not stored.
    fn save(&self, record: &SessionRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch a live record; `NotFound` if absent or already evicted,
    /// `Expired` if still present past its expiry.
    fn get(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<SessionRecord, StoreError>> + Send;

    /// Remove unconditionally. Deleting an absent id is not an error.
    fn delete(&self, session_id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Update `last_used` on a live record.
    fn touch(
        &self,
        session_id: &str,
        last_used: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Evict every expired record, returning how many were removed.
    fn purge_expired(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
