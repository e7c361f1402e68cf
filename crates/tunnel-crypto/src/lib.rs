//! Cryptographic primitives for Tunnel.
//!
//! This crate provides:
//! - X25519 key pairs and shared secret computation
//! - The HKDF-SHA256 key chain (`SessionKey`, then `AccessKey`)
//! - AES-256-GCM envelopes, hex-encoded as `nonce || ciphertext || tag`
//! - EAPI tokens: HMAC-SHA256 over a 30-second epoch counter
//!
//! # Design
//!
//! A client and a server each hold an X25519 key pair. After exchanging public
//! keys both sides compute the same shared secret and run it through the key
//! chain:
//!
//! ```text
//! SessionKey = HKDF(secret = SharedSecret, salt = SessionID, info = "SessionKey")
//! AccessKey  = HKDF(secret = SessionKey,   salt = empty,     info = "AccessKey")
//! ```
//!
//! The `AccessKey` seals every tunneled message and keys the EAPI token that
//! accompanies each request.

#![forbid(unsafe_code)]

pub mod aead;
pub mod eapi;
pub mod error;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, decrypt_to_string, encrypt, NONCE_LEN};
pub use eapi::{compute_eapi, compute_eapi_hex, epoch_at, verify_eapi, EAPI_WINDOW_SECS};
pub use error::CryptoError;
pub use kdf::{derive_access_key, derive_key, derive_session_key, AccessKey};
pub use keys::{compute_shared_secret, KeyPair, SharedSecret, KEY_LEN};
