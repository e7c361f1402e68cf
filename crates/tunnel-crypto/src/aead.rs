//! AES-256-GCM envelopes.
//!
//! Wire format, hex-encoded end to end:
//!
//! ```text
//! nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! Every call to [`encrypt`] draws a fresh random nonce.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;
use crate::kdf::AccessKey;

/// GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// Seal `plaintext` and return the hex-encoded envelope.
pub fn encrypt(plaintext: &[u8], key: &AccessKey) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: 32,
            actual: key.as_bytes().len(),
        }
    })?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Entropy(e.to_string()))?;

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&sealed);
    Ok(hex::encode(envelope))
}

/// Open a hex-encoded envelope.
///
/// Input shorter than the nonce, a bad tag, or the wrong key all yield
/// [`CryptoError::Authentication`].
pub fn decrypt(hex_envelope: &str, key: &AccessKey) -> Result<Vec<u8>, CryptoError> {
    let envelope = hex::decode(hex_envelope.trim())?;
    if envelope.len() < NONCE_LEN {
        return Err(CryptoError::Authentication);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: 32,
            actual: key.as_bytes().len(),
        }
    })?;

    let (nonce, sealed) = envelope.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Authentication)
}

/// Open an envelope whose plaintext is UTF-8 text.
pub fn decrypt_to_string(hex_envelope: &str, key: &AccessKey) -> Result<String, CryptoError> {
    let plaintext = decrypt(hex_envelope, key)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> AccessKey {
        AccessKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_encrypt_decrypt() {
        let k = key(1);
        let envelope = encrypt(b"hello tunnel", &k).unwrap();
        assert_eq!(decrypt(&envelope, &k).unwrap(), b"hello tunnel");
    }

    #[test]
    fn test_empty_plaintext() {
        let k = key(2);
        let envelope = encrypt(b"", &k).unwrap();
        // nonce + tag only
        assert_eq!(envelope.len(), (NONCE_LEN + 16) * 2);
        assert!(decrypt(&envelope, &k).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let envelope = encrypt(b"secret", &key(3)).unwrap();
        assert!(matches!(
            decrypt(&envelope, &key(4)),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_tampered_envelope_rejected() {
        let k = key(5);
        let envelope = encrypt(b"do not touch", &k).unwrap();
        let mut bytes = hex::decode(&envelope).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            decrypt(&hex::encode(bytes), &k),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_short_input_rejected() {
        let k = key(6);
        assert!(matches!(
            decrypt(&hex::encode([0u8; NONCE_LEN - 1]), &k),
            Err(CryptoError::Authentication)
        ));
        assert!(matches!(decrypt("", &k), Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_bad_hex_rejected() {
        assert!(matches!(
            decrypt("zz", &key(7)),
            Err(CryptoError::Encoding(_))
        ));
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let k = key(8);
        let a = encrypt(b"same", &k).unwrap();
        let b = encrypt(b"same", &k).unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..NONCE_LEN * 2], b[..NONCE_LEN * 2]);
    }
}
