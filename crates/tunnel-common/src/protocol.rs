//! Wire types shared by the server and the client.
//!
//! Requests are form-encoded, responses are JSON. Field names are fixed by
//! the protocol, hence the explicit renames.

use serde::{Deserialize, Serialize};

/// Route for the key exchange.
pub const KEY_EXCHANGE_PATH: &str = "/key-exchange";

/// Route for tunneled actions.
pub const ACTION_PATH: &str = "/action";

/// `POST /key-exchange` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyExchangeRequest {
    /// hex(32-byte X25519 public key)
    #[serde(rename = "ClientPublicKey", default)]
    pub client_public_key: String,
}

/// Successful key exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeResponse {
    #[serde(rename = "ServerPublicKey")]
    pub server_public_key: String,
    #[serde(rename = "SessionID")]
    pub session_id: String,
}

/// `POST /action` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionRequest {
    /// hex AES-GCM envelope
    #[serde(rename = "Data", default)]
    pub data: String,
    /// hex EAPI token
    #[serde(rename = "EAPI", default)]
    pub eapi: String,
    #[serde(rename = "SessionID", default)]
    pub session_id: String,
}

/// Successful tunneled action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// hex AES-GCM envelope
    #[serde(rename = "Data")]
    pub data: String,
}

/// Error body for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Error")]
    pub error: String,
}
