//! HKDF-SHA256 key chain.

use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::keys::{decode_key_hex, SharedSecret, KEY_LEN};

const SESSION_KEY_INFO: &[u8] = b"SessionKey";
const ACCESS_KEY_INFO: &[u8] = b"AccessKey";

/// HKDF extract-and-expand over SHA-256.
///
/// Fails only when `length` exceeds 255 * 32 bytes.
pub fn derive_key(
    secret: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), secret);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation(length))?;
    Ok(okm)
}

fn derive_key_32(secret: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), secret);
    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation(KEY_LEN))?;
    Ok(okm)
}

/// `SessionKey = HKDF(SharedSecret, salt = SessionID, info = "SessionKey")`.
pub fn derive_session_key(
    shared: &SharedSecret,
    session_id: &str,
) -> Result<SessionKey, CryptoError> {
    derive_key_32(shared.as_bytes(), session_id.as_bytes(), SESSION_KEY_INFO).map(SessionKey)
}

/// `AccessKey = HKDF(SessionKey, salt = empty, info = "AccessKey")`.
pub fn derive_access_key(session_key: &SessionKey) -> Result<AccessKey, CryptoError> {
    derive_key_32(&session_key.0, &[], ACCESS_KEY_INFO).map(AccessKey)
}

/// Intermediate key, only alive between the two derivation steps.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Per-session symmetric key used for envelopes and EAPI tokens.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccessKey([u8; KEY_LEN]);

impl AccessKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a stored slice; the slice must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(key))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        decode_key_hex(hex_str).map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessKey(..)")
    }
}
