use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tunnel_common::{Clock, SystemClock};

use super::{SessionRecord, SessionStore, StoreError};

/// In-process session store.
///
/// Expired entries are evicted lazily on read and by `purge_expired`.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of stored records, expired or not.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut guard = self.sessions.write().await;
        if record.is_expired_at(now) {
            guard.remove(&record.session_id);
            return Ok(());
        }
        guard.insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<SessionRecord, StoreError> {
        let now = self.clock.now();
        {
            let guard = self.sessions.read().await;
            match guard.get(session_id) {
                None => return Err(StoreError::NotFound),
                Some(record) if !record.is_expired_at(now) => return Ok(record.clone()),
                Some(_) => {}
            }
        }

        let mut guard = self.sessions.write().await;
        match guard.get(session_id).map(|record| record.is_expired_at(now)) {
            Some(true) => {
                guard.remove(session_id);
                Err(StoreError::Expired)
            }
            // replaced by a concurrent save
            Some(false) => guard.get(session_id).cloned().ok_or(StoreError::NotFound),
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn touch(&self, session_id: &str, last_used: DateTime<Utc>) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut guard = self.sessions.write().await;
        match guard.get_mut(session_id) {
            Some(record) if !record.is_expired_at(now) => {
                record.last_used = last_used;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut guard = self.sessions.write().await;
        let before = guard.len();
        guard.retain(|_, record| !record.is_expired_at(now));
        Ok((before - guard.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tunnel_common::ManualClock;
    use tunnel_crypto::AccessKey;

    fn store_at(secs: i64) -> (MemorySessionStore, ManualClock) {
        let clock = ManualClock::at_unix(secs);
        (MemorySessionStore::with_clock(Arc::new(clock.clone())), clock)
    }

    fn record(id: &str, clock: &ManualClock, ttl: Duration) -> SessionRecord {
        SessionRecord::new(id.into(), AccessKey::from_bytes([3u8; 32]), clock.now(), ttl)
    }

    #[tokio::test]
    async fn test_save_get_delete() {
        let (store, clock) = store_at(1_000);
        let rec = record("s1", &clock, Duration::hours(24));

        store.save(&rec).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), rec);

        store.delete("s1").await.unwrap();
        assert!(matches!(store.get("s1").await, Err(StoreError::NotFound)));

        // idempotent
        store.delete("s1").await.unwrap();
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let (store, clock) = store_at(1_000);
        let mut rec = record("s1", &clock, Duration::hours(1));
        store.save(&rec).await.unwrap();

        rec.expires_at += Duration::hours(1);
        store.save(&rec).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("s1").await.unwrap().expires_at, rec.expires_at);
    }

    #[tokio::test]
    async fn test_expired_record_unreadable() {
        let (store, clock) = store_at(1_000);
        store
            .save(&record("s1", &clock, Duration::seconds(60)))
            .await
            .unwrap();

        clock.advance(Duration::seconds(60));
        assert!(matches!(store.get("s1").await, Err(StoreError::Expired)));
        // evicted on read
        assert!(store.is_empty().await);
        assert!(matches!(store.get("s1").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_save_with_elapsed_ttl_is_dropped() {
        let (store, clock) = store_at(1_000);
        let rec = record("s1", &clock, Duration::seconds(-1));
        store.save(&rec).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_touch_updates_last_used() {
        let (store, clock) = store_at(1_000);
        store
            .save(&record("s1", &clock, Duration::hours(1)))
            .await
            .unwrap();

        clock.advance(Duration::minutes(5));
        store.touch("s1", clock.now()).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap().last_used, clock.now());

        assert!(matches!(
            store.touch("missing", clock.now()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = store_at(1_000);
        store
            .save(&record("short", &clock, Duration::seconds(10)))
            .await
            .unwrap();
        store
            .save(&record("long", &clock, Duration::hours(1)))
            .await
            .unwrap();

        clock.advance(Duration::seconds(11));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("long").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_saves_and_reads() {
        let (store, clock) = store_at(1_000);
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            let rec = record(&format!("s{i}"), &clock, Duration::hours(1));
            handles.push(tokio::spawn(async move {
                store.save(&rec).await.unwrap();
                store.get(&rec.session_id).await.unwrap()
            }));
        }
        for handle in handles {
            let rec = handle.await.unwrap();
            assert_eq!(rec.access_key, AccessKey::from_bytes([3u8; 32]));
        }
        assert_eq!(store.len().await, 32);
    }
}
