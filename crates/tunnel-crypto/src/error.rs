//! Errors raised by the primitive layer.

use thiserror::Error;

/// Primitive layer errors.
///
/// `Authentication` means the envelope was tampered with or sealed under a
/// different key. Callers must not retry it.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("entropy source failure: {0}")]
    Entropy(String),

    #[error("key derivation failed: requested {0} bytes")]
    KeyDerivation(usize),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("key agreement produced a non-contributory secret")]
    NonContributory,

    #[error("invalid hex encoding: {0}")]
    Encoding(#[from] hex::FromHexError),

    #[error("authentication failed: envelope rejected")]
    Authentication,

    #[error("encryption failed")]
    Encryption,
}
