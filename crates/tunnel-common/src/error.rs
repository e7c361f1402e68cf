//! Common error types for Tunnel.

use thiserror::Error;
use tunnel_crypto::CryptoError;

/// Result type alias using Tunnel's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Tunnel operations.
///
/// Variants follow the protocol's failure classes: input errors are never
/// retried, authentication errors may invalidate the session, cryptographic
/// errors mean tampering or a wrong key, transport errors end the current
/// handshake run.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed hex, public key or form data
    #[error("invalid input: {0}")]
    Input(String),

    /// Unknown or expired session, EAPI mismatch
    #[error("authentication error: {0}")]
    Auth(String),

    /// Cryptographic operation failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Network failure talking to the peer
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (file, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an input error from any displayable type.
    pub fn input(msg: impl std::fmt::Display) -> Self {
        Self::Input(msg.to_string())
    }

    /// Create an auth error from any displayable type.
    pub fn auth(msg: impl std::fmt::Display) -> Self {
        Self::Auth(msg.to_string())
    }

    /// Create a transport error from any displayable type.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Create a timeout error from any displayable type.
    pub fn timeout(msg: impl std::fmt::Display) -> Self {
        Self::Timeout(msg.to_string())
    }

    /// Create a not found error from any displayable type.
    pub fn not_found(msg: impl std::fmt::Display) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Create a serialization error from any displayable type.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create an internal error from any displayable type.
    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    /// Whether the peer rejected our session credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Network-class failures: the flow must be restarted by the caller.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(Error::auth("expired").is_auth());
        assert!(!Error::input("bad hex").is_auth());
        assert!(Error::transport("connection refused").is_transport());
        assert!(Error::timeout("10s").is_transport());
        assert!(!Error::from(CryptoError::Authentication).is_transport());
    }

    #[test]
    fn test_error_display() {
        let err = Error::from(CryptoError::Authentication);
        assert_eq!(
            err.to_string(),
            "crypto error: authentication failed: envelope rejected"
        );
        assert_eq!(
            Error::auth("Invalid SessionID or EAPI").to_string(),
            "authentication error: Invalid SessionID or EAPI"
        );
    }
}
