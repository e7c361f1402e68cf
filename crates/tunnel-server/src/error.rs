use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tunnel_common::ErrorResponse;

pub const MSG_BAD_PUBLIC_KEY: &str = "Unable to decode ClientPublicKey";
pub const MSG_BAD_SESSION: &str = "Invalid SessionID or EAPI";
pub const MSG_BAD_ENVELOPE: &str = "Unable to decrypt data";
pub const MSG_ENCRYPT_FAILED: &str = "Unable to encrypt response";
pub const MSG_REPLAY: &str = "Request already processed";
pub const MSG_INTERNAL: &str = "Internal server error";

/// Failure returned to HTTP callers as `{"Error": msg}`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed form data, hex or public key.
    #[error("{0}")]
    BadRequest(String),

    /// Unknown or expired session, EAPI mismatch, replay.
    #[error("{0}")]
    Unauthorized(String),

    /// Envelope failed authentication.
    #[error("{0}")]
    Decryption(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Decryption(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::Unauthorized(m) | Self::Decryption(m) | Self::Internal(m) => {
                m
            }
        }
    }

    pub(crate) fn unauthorized() -> Self {
        Self::Unauthorized(MSG_BAD_SESSION.to_string())
    }

    pub(crate) fn internal() -> Self {
        Self::Internal(MSG_INTERNAL.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.message().to_string(),
            }),
        )
            .into_response()
    }
}
