//! EAPI tokens: rolling, time-windowed proof of possession of the AccessKey.
//!
//! `token = HMAC-SHA256(AccessKey, epoch as 8 big-endian bytes)` with
//! `epoch = floor(unix_secs / 30)`. A validator accepts the token for the
//! current epoch and the one before it, so a token lives for at most two
//! windows. Tokens are not single-use.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::kdf::AccessKey;

type HmacSha256 = Hmac<Sha256>;

/// Width of one EAPI epoch.
pub const EAPI_WINDOW_SECS: i64 = 30;

/// Epoch counter for a unix timestamp in seconds.
pub fn epoch_at(unix_secs: i64) -> i64 {
    unix_secs.div_euclid(EAPI_WINDOW_SECS)
}

fn epoch_mac(access_key: &AccessKey, epoch: i64) -> HmacSha256 {
    let mut mac = match <HmacSha256 as Mac>::new_from_slice(access_key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(&epoch.to_be_bytes());
    mac
}

/// Raw EAPI token for `epoch`.
pub fn compute_eapi(access_key: &AccessKey, epoch: i64) -> [u8; 32] {
    epoch_mac(access_key, epoch).finalize().into_bytes().into()
}

/// Hex-encoded EAPI token for `epoch`, as sent on the wire.
pub fn compute_eapi_hex(access_key: &AccessKey, epoch: i64) -> String {
    hex::encode(compute_eapi(access_key, epoch))
}

/// Accept `token_hex` if it matches `current_epoch` or `current_epoch - 1`.
pub fn verify_eapi(access_key: &AccessKey, token_hex: &str, current_epoch: i64) -> bool {
    let Ok(received) = hex::decode(token_hex.trim()) else {
        return false;
    };

    [current_epoch, current_epoch - 1]
        .into_iter()
        .any(|epoch| epoch_mac(access_key, epoch).verify_slice(&received).is_ok())
}
