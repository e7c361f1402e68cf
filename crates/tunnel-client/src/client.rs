use std::sync::Arc;
use tracing::{debug, info, warn};
use tunnel_common::{ActionRequest, Clock, Error, KeyExchangeRequest, Result, SystemClock};
use tunnel_crypto::keys::decode_key_hex;
use tunnel_crypto::{
    compute_eapi_hex, decrypt_to_string, derive_access_key, derive_session_key, encrypt, epoch_at,
    KeyPair,
};

use crate::cache::{CachedSession, SessionCache};
use crate::transport::Transport;

/// Client side of a tunnel session.
///
/// Holds a key pair generated at construction, the active session (if any)
/// and the cache it is persisted to.
pub struct TunnelClient<T, C> {
    transport: T,
    cache: C,
    keypair: KeyPair,
    clock: Arc<dyn Clock>,
    session: Option<CachedSession>,
}

impl<T: Transport, C: SessionCache> TunnelClient<T, C> {
    /// Fails only if the OS entropy source does.
    pub fn new(transport: T, cache: C) -> Result<Self> {
        Ok(Self {
            transport,
            cache,
            keypair: KeyPair::generate()?,
            clock: Arc::new(SystemClock),
            session: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn public_hex(&self) -> String {
        self.keypair.public_hex()
    }

    pub fn session(&self) -> Option<&CachedSession> {
        self.session.as_ref()
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Adopt the cached session, if one is stored. Returns whether it was.
    pub fn load_cached_session(&mut self) -> Result<bool> {
        match self.cache.load()? {
            Some(session) => {
                debug!(session_id = %session.session_id, "loaded cached session");
                self.session = Some(session);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run the key exchange and persist the resulting session.
    pub async fn exchange_keys(&mut self) -> Result<()> {
        let resp = self
            .transport
            .key_exchange(&KeyExchangeRequest {
                client_public_key: self.keypair.public_hex(),
            })
            .await?;

        if resp.session_id.is_empty() {
            return Err(Error::input("server returned an empty SessionID"));
        }
        let server_public = decode_key_hex(&resp.server_public_key)
            .map_err(|e| Error::input(format!("failed to decode server public key: {e}")))?;

        let shared = self.keypair.shared_secret(&server_public)?;
        let session_key = derive_session_key(&shared, &resp.session_id)?;
        let session = CachedSession {
            session_id: resp.session_id,
            access_key: derive_access_key(&session_key)?,
        };

        self.cache.save(&session)?;
        info!(session_id = %session.session_id, "key exchange complete");
        self.session = Some(session);
        Ok(())
    }

    /// EAPI token for the current 30-second epoch.
    pub fn current_eapi(&self) -> Result<String> {
        let session = self.active_session()?;
        Ok(compute_eapi_hex(
            &session.access_key,
            epoch_at(self.clock.unix_secs()),
        ))
    }

    /// Send one tunneled message and return the decrypted reply.
    ///
    /// If the server rejects the session, the cached entry is cleared so the
    /// next run starts with a fresh key exchange.
    pub async fn send_message(&mut self, message: &str) -> Result<String> {
        let session = self.active_session()?;
        let req = ActionRequest {
            data: encrypt(message.as_bytes(), &session.access_key)?,
            eapi: self.current_eapi()?,
            session_id: session.session_id.clone(),
        };

        let resp = match self.transport.action(&req).await {
            Ok(resp) => resp,
            Err(e) if e.is_auth() => {
                warn!(session_id = %req.session_id, "session rejected by server, clearing cache");
                self.session = None;
                if let Err(clear_err) = self.cache.clear() {
                    warn!("failed to clear session cache: {}", clear_err);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let session = self.active_session()?;
        Ok(decrypt_to_string(&resp.data, &session.access_key)?)
    }

    fn active_session(&self) -> Result<&CachedSession> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::not_found("no active session"))
    }
}
