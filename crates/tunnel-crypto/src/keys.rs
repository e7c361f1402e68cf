//! X25519 key pairs and shared secrets.
//!
//! The server holds one long-lived [`KeyPair`] persisted across restarts; the
//! client generates a fresh pair per process. Only public halves travel over
//! the wire, hex-encoded.
//!
//! # Example
//!
//! ```
//! use tunnel_crypto::keys::KeyPair;
//!
//! let client = KeyPair::generate().unwrap();
//! let server = KeyPair::generate().unwrap();
//!
//! let a = client.shared_secret(&server.public_bytes()).unwrap();
//! let b = server.shared_secret(&client.public_bytes()).unwrap();
//! assert_eq!(a.as_bytes(), b.as_bytes());
//! ```

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Length of X25519 scalars, points and shared secrets.
pub const KEY_LEN: usize = 32;

/// X25519 key pair.
///
/// The private scalar is zeroized on drop.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Draw 32 bytes from the OS CSPRNG and derive the public point.
    ///
    /// Fails only when the entropy source does.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Entropy(e.to_string()))?;

        let keypair = Self::from_private_bytes(bytes);
        bytes.zeroize();
        Ok(keypair)
    }

    /// Rebuild a key pair from a stored private scalar.
    pub fn from_private_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from a hex-encoded private scalar.
    pub fn from_private_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let mut bytes = decode_key_hex(hex_str)?;
        let keypair = Self::from_private_bytes(bytes);
        bytes.zeroize();
        Ok(keypair)
    }

    /// Public point bytes.
    pub fn public_bytes(&self) -> [u8; KEY_LEN] {
        *self.public.as_bytes()
    }

    /// Hex-encoded public point, as sent on the wire.
    pub fn public_hex(&self) -> String {
        hex::encode(self.public.as_bytes())
    }

    /// Private scalar bytes.
    ///
    /// # Security
    /// Handle with care! These bytes can recreate the key pair.
    pub fn private_bytes(&self) -> [u8; KEY_LEN] {
        self.secret.to_bytes()
    }

    /// Compute the shared secret with a peer's public key.
    pub fn shared_secret(&self, their_public: &[u8; KEY_LEN]) -> Result<SharedSecret, CryptoError> {
        compute_shared_secret(&self.private_bytes(), their_public)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_hex())
            .finish_non_exhaustive()
    }
}

/// 32-byte ECDH output. Never transmitted or persisted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; KEY_LEN]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// X25519 scalar multiplication of `my_private` with `their_public`.
///
/// Rejects low-order peer points, which would yield an all-zero secret.
pub fn compute_shared_secret(
    my_private: &[u8; KEY_LEN],
    their_public: &[u8; KEY_LEN],
) -> Result<SharedSecret, CryptoError> {
    let secret = StaticSecret::from(*my_private);
    let shared = secret.diffie_hellman(&PublicKey::from(*their_public));

    if !shared.was_contributory() {
        return Err(CryptoError::NonContributory);
    }

    Ok(SharedSecret(*shared.as_bytes()))
}

/// Decode a hex string that must hold exactly one 32-byte key.
pub fn decode_key_hex(hex_str: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = hex::decode(hex_str.trim())?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LEN,
        actual,
    })
}
