use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-controller session counters.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    key_exchanges: AtomicU64,
    key_exchange_failures: AtomicU64,
    actions_served: AtomicU64,
    auth_failures: AtomicU64,
    decryption_failures: AtomicU64,
    replays_rejected: AtomicU64,
    sessions_expired: AtomicU64,
    sessions_purged: AtomicU64,
    internal_errors: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionMetricsSnapshot {
    pub key_exchanges: u64,
    pub key_exchange_failures: u64,
    pub actions_served: u64,
    pub auth_failures: u64,
    pub decryption_failures: u64,
    pub replays_rejected: u64,
    pub sessions_expired: u64,
    pub sessions_purged: u64,
    pub internal_errors: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl SessionMetrics {
    pub fn record_key_exchange(&self) {
        bump(&self.key_exchanges);
    }

    pub fn record_key_exchange_failure(&self) {
        bump(&self.key_exchange_failures);
    }

    pub fn record_action(&self) {
        bump(&self.actions_served);
    }

    pub fn record_auth_failure(&self) {
        bump(&self.auth_failures);
    }

    pub fn record_decryption_failure(&self) {
        bump(&self.decryption_failures);
    }

    pub fn record_replay(&self) {
        bump(&self.replays_rejected);
    }

    pub fn record_expired(&self) {
        bump(&self.sessions_expired);
    }

    pub fn record_purged(&self, count: u64) {
        self.sessions_purged.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_internal_error(&self) {
        bump(&self.internal_errors);
    }

    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            key_exchanges: self.key_exchanges.load(Ordering::Relaxed),
            key_exchange_failures: self.key_exchange_failures.load(Ordering::Relaxed),
            actions_served: self.actions_served.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            decryption_failures: self.decryption_failures.load(Ordering::Relaxed),
            replays_rejected: self.replays_rejected.load(Ordering::Relaxed),
            sessions_expired: self.sessions_expired.load(Ordering::Relaxed),
            sessions_purged: self.sessions_purged.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
        }
    }
}
