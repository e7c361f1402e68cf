use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tunnel_common::{Clock, SystemClock};
use tunnel_crypto::AccessKey;

use super::{SessionRecord, SessionStore, StoreError};

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    access_key: Vec<u8>,
    last_used_ms: i64,
    expires_at_ms: i64,
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            access_key: AccessKey::from_slice(&row.access_key)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            last_used: from_millis(row.last_used_ms)?,
            expires_at: from_millis(row.expires_at_ms)?,
            session_id: row.session_id,
        })
    }
}

/// SQLite-backed session store.
///
/// Expiry is stored as an absolute timestamp; every read checks it so an
/// expired row is never returned, even before the sweeper deletes it.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Rows currently stored, including expired ones not yet purged.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

impl SessionStore for SqliteSessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        if record.is_expired_at(self.clock.now()) {
            self.delete(&record.session_id).await?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, access_key, last_used_ms, expires_at_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                access_key = excluded.access_key,
                last_used_ms = excluded.last_used_ms,
                expires_at_ms = excluded.expires_at_ms
            "#,
        )
        .bind(&record.session_id)
        .bind(record.access_key.as_bytes().as_slice())
        .bind(record.last_used.timestamp_millis())
        .bind(record.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<SessionRecord, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, access_key, last_used_ms, expires_at_ms
            FROM sessions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        if row.expires_at_ms <= self.now_ms() {
            return Err(StoreError::Expired);
        }
        row.try_into()
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch(&self, session_id: &str, last_used: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET last_used_ms = ? WHERE session_id = ? AND expires_at_ms > ?",
        )
        .bind(last_used.timestamp_millis())
        .bind(session_id)
        .bind(self.now_ms())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at_ms <= ?")
            .bind(self.now_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
