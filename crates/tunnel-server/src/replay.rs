//! Replay guard for tunneled actions.
//!
//! An EAPI token stays valid for up to two 30-second windows and is not bound
//! to the request, so a captured `{SessionID, EAPI, Data}` triple could be
//! resent verbatim. Every envelope carries a fresh random nonce, so a
//! legitimate client never sends the same `Data` twice; the guard remembers
//! fingerprints of accepted envelopes for as long as their token could still
//! validate.
//!
//! # Design
//!
//! - Fingerprint: SHA-256 over `SessionID || 0x00 || Data`
//! - Retention: two EAPI windows after first acceptance
//! - `seen` is a cheap pre-check; `check_and_record` is the atomic commit
//!   done only after the envelope decrypted
//! - Capacity is per session. A session at its cap loses its own oldest
//!   fingerprint; other sessions are never affected and a fresh envelope is
//!   never refused for lack of room.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tunnel_crypto::EAPI_WINDOW_SECS;

type Fingerprint = [u8; 32];
type SessionEntries = HashMap<Fingerprint, DateTime<Utc>>;

/// Remembers recently accepted envelopes per session.
pub struct ReplayGuard {
    retention: Duration,
    max_per_session: usize,
    sessions: Mutex<HashMap<String, SessionEntries>>,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayGuard {
    /// Default cap on remembered fingerprints for one session.
    pub const DEFAULT_MAX_PER_SESSION: usize = 4096;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_PER_SESSION)
    }

    /// Default retention with a custom per-session cap.
    pub fn with_capacity(max_per_session: usize) -> Self {
        Self::with_limits(Duration::seconds(2 * EAPI_WINDOW_SECS), max_per_session)
    }

    pub fn with_limits(retention: Duration, max_per_session: usize) -> Self {
        Self {
            retention,
            max_per_session: max_per_session.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn fingerprint(session_id: &str, data: &str) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(data.as_bytes());
        hasher.finalize().into()
    }

    // The map holds no invariant a panicking holder could break halfway.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntries>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether this envelope was already accepted and is still retained.
    ///
    /// Does NOT record anything. Use `check_and_record` for that.
    pub fn seen(&self, session_id: &str, data: &str, now: DateTime<Utc>) -> bool {
        let key = Self::fingerprint(session_id, data);
        self.lock()
            .get(session_id)
            .and_then(|entries| entries.get(&key))
            .is_some_and(|first_seen| now - *first_seen < self.retention)
    }

    /// Record the envelope. Returns `false` only if it is a replay.
    pub fn check_and_record(&self, session_id: &str, data: &str, now: DateTime<Utc>) -> bool {
        let key = Self::fingerprint(session_id, data);
        let retention = self.retention;
        let mut sessions = self.lock();
        let entries = sessions.entry(session_id.to_string()).or_default();

        if let Some(first_seen) = entries.get(&key) {
            if now - *first_seen < retention {
                return false;
            }
        }

        if entries.len() >= self.max_per_session {
            entries.retain(|_, first_seen| now - *first_seen < retention);
        }
        if entries.len() >= self.max_per_session {
            let oldest = entries
                .iter()
                .min_by_key(|(_, first_seen)| **first_seen)
                .map(|(fp, _)| *fp);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(key, now);
        true
    }

    /// Drop fingerprints older than the retention period.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let retention = self.retention;
        let mut sessions = self.lock();
        let mut removed = 0;
        sessions.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|_, first_seen| now - *first_seen < retention);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    /// Fingerprints currently remembered across all sessions.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
