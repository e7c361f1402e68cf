//! Long-term server key storage.
//!
//! The server reuses one X25519 key pair for every session. It lives in the
//! `server_keys` table under a fixed identifier (`production` by default) and
//! is generated on first start.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use tunnel_crypto::KeyPair;

use crate::store::StoreError;

/// Default identifier for the server key pair.
pub const DEFAULT_KEY_ID: &str = "production";

#[derive(Debug, sqlx::FromRow)]
struct ServerKeyRow {
    private_key: String,
    public_key: String,
}

/// Hex-encoded key pairs keyed by identifier.
#[derive(Clone)]
pub struct ServerKeyStore {
    pool: SqlitePool,
}

impl ServerKeyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the key pair stored under `key_id`, if any.
    ///
    /// A row whose public half does not match its private scalar is corrupt.
    pub async fn get(&self, key_id: &str) -> Result<Option<KeyPair>, StoreError> {
        let row = sqlx::query_as::<_, ServerKeyRow>(
            "SELECT private_key, public_key FROM server_keys WHERE key_id = ?",
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let keypair = KeyPair::from_private_hex(&row.private_key)?;
        if !keypair.public_hex().eq_ignore_ascii_case(&row.public_key) {
            return Err(StoreError::Corrupt(format!(
                "public key mismatch for server key '{key_id}'"
            )));
        }
        Ok(Some(keypair))
    }

    /// Store `keypair` under `key_id`, replacing any previous pair.
    pub async fn set(&self, key_id: &str, keypair: &KeyPair) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO server_keys (key_id, private_key, public_key, created_at_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key_id) DO UPDATE SET
                private_key = excluded.private_key,
                public_key = excluded.public_key,
                created_at_ms = excluded.created_at_ms
            "#,
        )
        .bind(key_id)
        .bind(hex::encode(keypair.private_bytes()))
        .bind(keypair.public_hex())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove the pair stored under `key_id`. Returns whether a row existed.
    pub async fn delete(&self, key_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM server_keys WHERE key_id = ?")
            .bind(key_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load the pair under `key_id`, generating and persisting one if absent.
    pub async fn load_or_generate(&self, key_id: &str) -> Result<KeyPair, StoreError> {
        if let Some(keypair) = self.get(key_id).await? {
            info!(key_id, public_key = %keypair.public_hex(), "loaded server key pair");
            return Ok(keypair);
        }

        let keypair = KeyPair::generate()?;
        self.set(key_id, &keypair).await?;
        info!(key_id, public_key = %keypair.public_hex(), "generated server key pair");
        Ok(keypair)
    }
}
