/// Security audit logging for session lifecycle and access events
use tracing::{error, info, warn};

/// Session and access events recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventType {
    /// Key exchange completed, session created
    KeyExchange,
    /// Malformed key exchange or action request
    ValidationError,
    /// EAPI accepted for a live session
    AccessGranted,
    /// Unknown session or EAPI mismatch
    AccessDenied,
    /// Session past its expiry was deleted on access
    SessionExpired,
    /// Envelope failed authentication
    DecryptionFailed,
    /// Envelope already accepted within the EAPI window
    ReplayRejected,
    /// Store or encryption failure
    InternalError,
}

impl SessionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyExchange => "KEY_EXCHANGE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::AccessGranted => "ACCESS_GRANTED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::DecryptionFailed => "DECRYPTION_FAILED",
            Self::ReplayRejected => "REPLAY_REJECTED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Reason codes for rejected requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Public key is not 32 hex-encoded bytes
    InvalidPublicKey,
    /// Request is missing a field
    MissingField,
    /// No live record for the SessionID
    UnknownSession,
    /// Record found but past its expiry
    Expired,
    /// Token matched neither the current nor the previous epoch
    EapiMismatch,
    /// AES-GCM tag did not verify
    BadEnvelope,
    /// Envelope fingerprint already recorded
    Replay,
    /// Store unavailable
    StoreFailure,
    /// HKDF chain failed
    KeyDerivation,
    /// Response could not be sealed
    EncryptionFailure,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPublicKey => "INVALID_PUBLIC_KEY",
            Self::MissingField => "MISSING_FIELD",
            Self::UnknownSession => "UNKNOWN_SESSION",
            Self::Expired => "EXPIRED",
            Self::EapiMismatch => "EAPI_MISMATCH",
            Self::BadEnvelope => "BAD_ENVELOPE",
            Self::Replay => "REPLAY",
            Self::StoreFailure => "STORE_FAILURE",
            Self::KeyDerivation => "KEY_DERIVATION",
            Self::EncryptionFailure => "ENCRYPTION_FAILURE",
        }
    }
}

/// Log a session event for audit purposes.
///
/// SessionIDs are bearer identifiers but carry no key material, so they are
/// logged as-is. Keys and tokens are never logged.
pub fn log_session_event(
    event_type: SessionEventType,
    session_id: Option<&str>,
    reason: Option<FailureReason>,
    additional_context: Option<&str>,
) {
    let event_str = event_type.as_str();
    let reason_str = reason.map(|r| r.as_str());

    match event_type {
        SessionEventType::KeyExchange => {
            info!(event = event_str, session_id = session_id, "Session established");
        }
        SessionEventType::AccessGranted => {
            info!(event = event_str, session_id = session_id, "Access granted");
        }
        SessionEventType::ValidationError => {
            warn!(
                event = event_str,
                reason = reason_str,
                context = additional_context,
                "Invalid request format"
            );
        }
        SessionEventType::AccessDenied => {
            warn!(
                event = event_str,
                session_id = session_id,
                reason = reason_str,
                "Access denied"
            );
        }
        SessionEventType::SessionExpired => {
            info!(
                event = event_str,
                session_id = session_id,
                "Expired session deleted"
            );
        }
        SessionEventType::DecryptionFailed => {
            warn!(
                event = event_str,
                session_id = session_id,
                reason = reason_str,
                "Envelope rejected"
            );
        }
        SessionEventType::ReplayRejected => {
            warn!(
                event = event_str,
                session_id = session_id,
                reason = reason_str,
                "Replayed envelope rejected"
            );
        }
        SessionEventType::InternalError => {
            error!(
                event = event_str,
                session_id = session_id,
                reason = reason_str,
                context = additional_context,
                "Internal error during session operation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_strings() {
        assert_eq!(SessionEventType::KeyExchange.as_str(), "KEY_EXCHANGE");
        assert_eq!(SessionEventType::AccessDenied.as_str(), "ACCESS_DENIED");
        assert_eq!(SessionEventType::ReplayRejected.as_str(), "REPLAY_REJECTED");
    }

    #[test]
    fn test_failure_reason_strings() {
        assert_eq!(FailureReason::EapiMismatch.as_str(), "EAPI_MISMATCH");
        assert_eq!(FailureReason::UnknownSession.as_str(), "UNKNOWN_SESSION");
        assert_eq!(FailureReason::BadEnvelope.as_str(), "BAD_ENVELOPE");
    }

    #[test]
    fn test_log_session_event_without_subscriber() {
        log_session_event(
            SessionEventType::AccessDenied,
            Some("s1"),
            Some(FailureReason::EapiMismatch),
            None,
        );
        log_session_event(
            SessionEventType::InternalError,
            None,
            Some(FailureReason::StoreFailure),
            Some("database is locked"),
        );
    }
}
