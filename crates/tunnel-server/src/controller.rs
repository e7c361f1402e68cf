//! Server Session Controller.
//!
//! Owns the long-term server key pair and drives the server side of a
//! session:
//!
//! ```text
//! no-session -> session-established -> (validated-access)* -> expired-or-deleted
//! ```
//!
//! Validation of a record past its expiry always deletes it; nothing moves a
//! session back out of `expired-or-deleted`.

use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tunnel_common::{ActionRequest, ActionResponse, Clock, KeyExchangeResponse, SystemClock};
use tunnel_crypto::keys::decode_key_hex;
use tunnel_crypto::{
    decrypt_to_string, derive_access_key, derive_session_key, encrypt, epoch_at, verify_eapi,
    CryptoError, KeyPair,
};
use uuid::Uuid;

use crate::audit::{log_session_event, FailureReason, SessionEventType};
use crate::error::{ApiError, MSG_BAD_ENVELOPE, MSG_BAD_PUBLIC_KEY, MSG_ENCRYPT_FAILED, MSG_REPLAY};
use crate::metrics::{SessionMetrics, SessionMetricsSnapshot};
use crate::replay::ReplayGuard;
use crate::store::{SessionRecord, SessionStore, StoreError};

/// Business logic behind `/action`: decrypted request in, plaintext reply out.
pub type ActionHandler = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Replies `pong` to `ping` and echoes everything else.
pub fn default_handler() -> ActionHandler {
    Arc::new(|data: String| {
        if data == "ping" {
            "pong".to_string()
        } else {
            data
        }
    })
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Lifetime of a session from key exchange.
    pub session_ttl: Duration,
    /// Refuse an envelope already accepted within the EAPI window.
    pub reject_replays: bool,
    /// Replay fingerprints remembered per session.
    pub replay_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(24),
            reject_replays: true,
            replay_capacity: ReplayGuard::DEFAULT_MAX_PER_SESSION,
        }
    }
}

pub struct SessionController<S> {
    store: S,
    keypair: KeyPair,
    handler: ActionHandler,
    clock: Arc<dyn Clock>,
    config: ControllerConfig,
    replay: ReplayGuard,
    metrics: SessionMetrics,
}

impl<S: SessionStore> SessionController<S> {
    pub fn new(store: S, keypair: KeyPair) -> Self {
        Self {
            store,
            keypair,
            handler: default_handler(),
            clock: Arc::new(SystemClock),
            config: ControllerConfig::default(),
            replay: ReplayGuard::new(),
            metrics: SessionMetrics::default(),
        }
    }

    pub fn with_handler(mut self, handler: ActionHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.replay = ReplayGuard::with_capacity(config.replay_capacity);
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn server_public_hex(&self) -> String {
        self.keypair.public_hex()
    }

    pub fn metrics(&self) -> SessionMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Complete a key exchange for a hex-encoded client public key.
    ///
    /// Nothing is persisted unless every step succeeds.
    pub async fn key_exchange(
        &self,
        client_public_hex: &str,
    ) -> Result<KeyExchangeResponse, ApiError> {
        let client_public = decode_key_hex(client_public_hex.trim()).map_err(|e| {
            self.reject_public_key(&e);
            ApiError::BadRequest(MSG_BAD_PUBLIC_KEY.to_string())
        })?;

        let session_id = Uuid::new_v4().to_string();
        // SharedSecret and SessionKey are dropped (and zeroized) here
        let access_key = {
            let shared = self.keypair.shared_secret(&client_public).map_err(|e| {
                self.reject_public_key(&e);
                ApiError::BadRequest(MSG_BAD_PUBLIC_KEY.to_string())
            })?;
            derive_session_key(&shared, &session_id)
                .and_then(|session_key| derive_access_key(&session_key))
                .map_err(|e| self.internal_failure(None, FailureReason::KeyDerivation, &e))?
        };

        let record = SessionRecord::new(
            session_id.clone(),
            access_key,
            self.clock.now(),
            self.config.session_ttl,
        );
        self.store
            .save(&record)
            .await
            .map_err(|e| self.internal_failure(Some(&session_id), FailureReason::StoreFailure, &e))?;

        self.metrics.record_key_exchange();
        log_session_event(SessionEventType::KeyExchange, Some(&session_id), None, None);

        Ok(KeyExchangeResponse {
            server_public_key: self.keypair.public_hex(),
            session_id,
        })
    }

    /// Check `token` against the session's AccessKey for the current or the
    /// previous epoch, refreshing `last_used` on success.
    pub async fn validate_eapi(
        &self,
        session_id: &str,
        token: &str,
    ) -> Result<SessionRecord, ApiError> {
        if session_id.is_empty() {
            return Err(self.deny(None, FailureReason::MissingField));
        }

        let now = self.clock.now();
        let lookup = match self.store.get(session_id).await {
            Ok(record) if record.is_expired_at(now) => Err(StoreError::Expired),
            other => other,
        };
        let mut record = match lookup {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                self.discard(session_id).await;
                return Err(self.deny(Some(session_id), FailureReason::UnknownSession));
            }
            Err(StoreError::Expired) => {
                self.discard(session_id).await;
                self.metrics.record_expired();
                log_session_event(SessionEventType::SessionExpired, Some(session_id), None, None);
                return Err(self.deny(Some(session_id), FailureReason::Expired));
            }
            Err(e) => {
                return Err(self.internal_failure(
                    Some(session_id),
                    FailureReason::StoreFailure,
                    &e,
                ))
            }
        };

        if !verify_eapi(&record.access_key, token, epoch_at(now.timestamp())) {
            return Err(self.deny(Some(session_id), FailureReason::EapiMismatch));
        }

        // best-effort
        if let Err(e) = self.store.touch(session_id, now).await {
            warn!(session_id, "failed to update last_used: {}", e);
        }
        record.last_used = now;

        log_session_event(SessionEventType::AccessGranted, Some(session_id), None, None);
        Ok(record)
    }

    /// Validate, decrypt, run the handler and seal its reply.
    pub async fn handle_action(&self, req: &ActionRequest) -> Result<ActionResponse, ApiError> {
        let record = self.validate_eapi(&req.session_id, &req.eapi).await?;
        let now = self.clock.now();

        if self.config.reject_replays && self.replay.seen(&record.session_id, &req.data, now) {
            return Err(self.replayed(&record.session_id));
        }

        let plaintext = decrypt_to_string(&req.data, &record.access_key).map_err(|e| {
            self.metrics.record_decryption_failure();
            debug!(session_id = %record.session_id, "envelope rejected: {}", e);
            log_session_event(
                SessionEventType::DecryptionFailed,
                Some(&record.session_id),
                Some(FailureReason::BadEnvelope),
                None,
            );
            ApiError::Decryption(MSG_BAD_ENVELOPE.to_string())
        })?;

        if self.config.reject_replays
            && !self
                .replay
                .check_and_record(&record.session_id, &req.data, now)
        {
            return Err(self.replayed(&record.session_id));
        }

        let reply = (self.handler)(plaintext);

        let data = encrypt(reply.as_bytes(), &record.access_key).map_err(|e| {
            self.metrics.record_internal_error();
            log_session_event(
                SessionEventType::InternalError,
                Some(&record.session_id),
                Some(FailureReason::EncryptionFailure),
                Some(&e.to_string()),
            );
            ApiError::Internal(MSG_ENCRYPT_FAILED.to_string())
        })?;

        self.metrics.record_action();
        Ok(ActionResponse { data })
    }

    /// Evict expired sessions and stale replay fingerprints.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let purged = self.store.purge_expired().await?;
        self.replay.prune(self.clock.now());
        self.metrics.record_purged(purged);
        Ok(purged)
    }

    async fn discard(&self, session_id: &str) {
        if let Err(e) = self.store.delete(session_id).await {
            warn!(session_id, "failed to delete session: {}", e);
        }
    }

    fn deny(&self, session_id: Option<&str>, reason: FailureReason) -> ApiError {
        self.metrics.record_auth_failure();
        log_session_event(SessionEventType::AccessDenied, session_id, Some(reason), None);
        ApiError::unauthorized()
    }

    fn replayed(&self, session_id: &str) -> ApiError {
        self.metrics.record_replay();
        log_session_event(
            SessionEventType::ReplayRejected,
            Some(session_id),
            Some(FailureReason::Replay),
            None,
        );
        ApiError::Unauthorized(MSG_REPLAY.to_string())
    }

    fn reject_public_key(&self, err: &CryptoError) {
        self.metrics.record_key_exchange_failure();
        log_session_event(
            SessionEventType::ValidationError,
            None,
            Some(FailureReason::InvalidPublicKey),
            Some(&err.to_string()),
        );
    }

    fn internal_failure(
        &self,
        session_id: Option<&str>,
        reason: FailureReason,
        err: &dyn std::fmt::Display,
    ) -> ApiError {
        self.metrics.record_internal_error();
        log_session_event(
            SessionEventType::InternalError,
            session_id,
            Some(reason),
            Some(&err.to_string()),
        );
        ApiError::internal()
    }
}

/// Periodically evict expired sessions until the task is aborted.
pub fn spawn_session_sweeper<S: SessionStore>(
    controller: Arc<SessionController<S>>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match controller.purge_expired().await {
                Ok(count) if count > 0 => info!("purged {} expired sessions", count),
                Ok(_) => {}
                Err(err) => warn!("failed to purge expired sessions: {}", err),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;
    use tunnel_common::ManualClock;
    use tunnel_crypto::{compute_eapi_hex, decrypt_to_string, AccessKey};

    struct Harness {
        controller: SessionController<MemorySessionStore>,
        clock: ManualClock,
        server_public: [u8; 32],
    }

    fn harness() -> Harness {
        let clock = ManualClock::at_unix(1_700_000_000);
        let store = MemorySessionStore::with_clock(Arc::new(clock.clone()));
        let keypair = KeyPair::generate().unwrap();
        let server_public = keypair.public_bytes();
        let controller =
            SessionController::new(store, keypair).with_clock(Arc::new(clock.clone()));
        Harness {
            controller,
            clock,
            server_public,
        }
    }

    async fn establish(h: &Harness) -> (String, AccessKey) {
        let client = KeyPair::generate().unwrap();
        let resp = h.controller.key_exchange(&client.public_hex()).await.unwrap();
        assert_eq!(resp.server_public_key, hex::encode(h.server_public));

        let shared = client.shared_secret(&h.server_public).unwrap();
        let access = derive_access_key(&derive_session_key(&shared, &resp.session_id).unwrap())
            .unwrap();
        (resp.session_id, access)
    }

    fn action(h: &Harness, session_id: &str, key: &AccessKey, msg: &str) -> ActionRequest {
        ActionRequest {
            data: encrypt(msg.as_bytes(), key).unwrap(),
            eapi: compute_eapi_hex(key, epoch_at(h.clock.unix_secs())),
            session_id: session_id.to_string(),
        }
    }

    #[test]
    fn test_default_handler() {
        let handler = default_handler();
        assert_eq!(handler("ping".into()), "pong");
        assert_eq!(handler("hello".into()), "hello");
    }

    #[tokio::test]
    async fn test_key_exchange_rejects_malformed_keys() {
        let h = harness();
        let too_long = "00".repeat(33);
        for bad in ["", "zz", "abcd", too_long.as_str()] {
            let err = h.controller.key_exchange(bad).await.unwrap_err();
            assert_eq!(err, ApiError::BadRequest(MSG_BAD_PUBLIC_KEY.into()));
        }
        // all-zero point is low order
        let err = h.controller.key_exchange(&"00".repeat(32)).await.unwrap_err();
        assert_eq!(err, ApiError::BadRequest(MSG_BAD_PUBLIC_KEY.into()));

        assert!(h.controller.store().is_empty().await);
        assert_eq!(h.controller.metrics().key_exchange_failures, 5);
    }

    #[tokio::test]
    async fn test_key_exchange_persists_record() {
        let h = harness();
        let (session_id, access) = establish(&h).await;

        let record = h.controller.store().get(&session_id).await.unwrap();
        assert_eq!(record.access_key, access);
        assert_eq!(record.expires_at, h.clock.now() + Duration::hours(24));
        assert_eq!(h.controller.metrics().key_exchanges, 1);
    }

    #[tokio::test]
    async fn test_validate_updates_last_used() {
        let h = harness();
        let (session_id, access) = establish(&h).await;

        h.clock.advance(Duration::minutes(10));
        let token = compute_eapi_hex(&access, epoch_at(h.clock.unix_secs()));
        let record = h.controller.validate_eapi(&session_id, &token).await.unwrap();
        assert_eq!(record.last_used, h.clock.now());

        let stored = h.controller.store().get(&session_id).await.unwrap();
        assert_eq!(stored.last_used, h.clock.now());
    }

    #[tokio::test]
    async fn test_validate_accepts_previous_epoch_only() {
        let h = harness();
        let (session_id, access) = establish(&h).await;
        let epoch = epoch_at(h.clock.unix_secs());
        let token = compute_eapi_hex(&access, epoch);

        h.clock.advance(Duration::seconds(30));
        assert!(h.controller.validate_eapi(&session_id, &token).await.is_ok());

        h.clock.advance(Duration::seconds(30));
        assert_eq!(
            h.controller.validate_eapi(&session_id, &token).await.unwrap_err(),
            ApiError::unauthorized()
        );
    }

    #[tokio::test]
    async fn test_validate_unknown_session() {
        let h = harness();
        let (_, access) = establish(&h).await;
        let token = compute_eapi_hex(&access, epoch_at(h.clock.unix_secs()));

        let err = h.controller.validate_eapi("nope", &token).await.unwrap_err();
        assert_eq!(err, ApiError::unauthorized());
        let err = h.controller.validate_eapi("", &token).await.unwrap_err();
        assert_eq!(err, ApiError::unauthorized());
    }

    #[tokio::test]
    async fn test_expired_session_is_deleted() {
        let h = harness();
        let (session_id, access) = establish(&h).await;

        h.clock.advance(Duration::hours(24));
        let token = compute_eapi_hex(&access, epoch_at(h.clock.unix_secs()));
        let err = h.controller.validate_eapi(&session_id, &token).await.unwrap_err();
        assert_eq!(err, ApiError::unauthorized());
        assert!(matches!(
            h.controller.store().get(&session_id).await,
            Err(StoreError::NotFound)
        ));
        assert!(h.controller.store().is_empty().await);

        let metrics = h.controller.metrics();
        assert_eq!(metrics.sessions_expired, 1);
        assert_eq!(metrics.auth_failures, 1);

        // a second attempt finds nothing left to expire
        h.controller.validate_eapi(&session_id, &token).await.unwrap_err();
        assert_eq!(h.controller.metrics().sessions_expired, 1);
    }

    #[tokio::test]
    async fn test_handle_action_ping_pong() {
        let h = harness();
        let (session_id, access) = establish(&h).await;

        let resp = h
            .controller
            .handle_action(&action(&h, &session_id, &access, "ping"))
            .await
            .unwrap();
        assert_eq!(decrypt_to_string(&resp.data, &access).unwrap(), "pong");
        assert_eq!(h.controller.metrics().actions_served, 1);
    }

    #[tokio::test]
    async fn test_handle_action_custom_handler() {
        let h = harness();
        let h = Harness {
            controller: h
                .controller
                .with_handler(Arc::new(|s: String| s.to_uppercase())),
            ..h
        };
        let (session_id, access) = establish(&h).await;

        let resp = h
            .controller
            .handle_action(&action(&h, &session_id, &access, "hello"))
            .await
            .unwrap();
        assert_eq!(decrypt_to_string(&resp.data, &access).unwrap(), "HELLO");
    }

    #[tokio::test]
    async fn test_handle_action_bad_eapi_before_payload() {
        let h = harness();
        let (session_id, access) = establish(&h).await;
        let mut req = action(&h, &session_id, &access, "ping");
        req.eapi = compute_eapi_hex(&AccessKey::from_bytes([9u8; 32]), 0);
        req.data = "not hex".into();

        let err = h.controller.handle_action(&req).await.unwrap_err();
        assert_eq!(err, ApiError::unauthorized());
        assert_eq!(h.controller.metrics().decryption_failures, 0);
    }

    #[tokio::test]
    async fn test_handle_action_tampered_envelope() {
        let h = harness();
        let (session_id, access) = establish(&h).await;
        let mut req = action(&h, &session_id, &access, "ping");
        let last = req.data.pop().unwrap();
        req.data.push(if last == '0' { '1' } else { '0' });

        let err = h.controller.handle_action(&req).await.unwrap_err();
        assert_eq!(err, ApiError::Decryption(MSG_BAD_ENVELOPE.into()));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_replayed_envelope_rejected() {
        let h = harness();
        let (session_id, access) = establish(&h).await;
        let req = action(&h, &session_id, &access, "ping");

        h.controller.handle_action(&req).await.unwrap();
        let err = h.controller.handle_action(&req).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized(MSG_REPLAY.into()));
        assert_eq!(h.controller.metrics().replays_rejected, 1);

        // a fresh envelope for the same message is fine
        h.controller
            .handle_action(&action(&h, &session_id, &access, "ping"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_replay_allowed_when_disabled() {
        let h = harness();
        let h = Harness {
            controller: h.controller.with_config(ControllerConfig {
                reject_replays: false,
                ..ControllerConfig::default()
            }),
            ..h
        };
        let (session_id, access) = establish(&h).await;
        let req = action(&h, &session_id, &access, "ping");

        h.controller.handle_action(&req).await.unwrap();
        h.controller.handle_action(&req).await.unwrap();
    }

    #[tokio::test]
    async fn test_busy_session_cannot_lock_out_others() {
        let h = harness();
        let h = Harness {
            controller: h.controller.with_config(ControllerConfig {
                replay_capacity: 3,
                ..ControllerConfig::default()
            }),
            ..h
        };
        let (noisy_id, noisy_key) = establish(&h).await;
        let (quiet_id, quiet_key) = establish(&h).await;

        for _ in 0..10 {
            h.controller
                .handle_action(&action(&h, &noisy_id, &noisy_key, "ping"))
                .await
                .unwrap();
        }

        let resp = h
            .controller
            .handle_action(&action(&h, &quiet_id, &quiet_key, "ping"))
            .await
            .unwrap();
        assert_eq!(decrypt_to_string(&resp.data, &quiet_key).unwrap(), "pong");
        assert_eq!(h.controller.metrics().replays_rejected, 0);
        assert_eq!(h.controller.metrics().auth_failures, 0);
    }

    #[tokio::test]
    async fn test_purge_expired_counts() {
        let h = harness();
        establish(&h).await;
        establish(&h).await;

        h.clock.advance(Duration::hours(25));
        assert_eq!(h.controller.purge_expired().await.unwrap(), 2);
        assert_eq!(h.controller.metrics().sessions_purged, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_expired_sessions() {
        let h = harness();
        let clock = h.clock.clone();
        let controller = Arc::new(h.controller);
        for _ in 0..2 {
            controller
                .key_exchange(&KeyPair::generate().unwrap().public_hex())
                .await
                .unwrap();
        }

        let sweeper = spawn_session_sweeper(controller.clone(), std::time::Duration::from_secs(1));
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(controller.store().len().await, 2);
        assert_eq!(controller.metrics().sessions_purged, 0);

        clock.advance(Duration::hours(25));
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert!(controller.store().is_empty().await);
        assert_eq!(controller.metrics().sessions_purged, 2);

        sweeper.abort();
    }
}
