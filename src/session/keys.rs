//! Key agreement for a freshly scanned QR code and the restore challenge.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use crate::crypto::{cbc_decrypt, hkdf_sha256, hmac_sha256, verify_hmac_sha256, CryptoError, KeyPair};

/// Length of the secret blob the phone sends after scanning.
pub const SECRET_LEN: usize = 144;

/// The two 32-byte keys protecting binary frames.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub enc_key: [u8; 32],
    pub mac_key: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys([REDACTED])")
    }
}

/// Login and restore failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("secret has length {0}, expected 144")]
    InvalidSecretLength(usize),
    #[error("secret failed verification, abort login")]
    SecretMismatch,
    #[error("error decrypting keys: {0}")]
    KeyDecryption(#[from] CryptoError),
    #[error("invalid base64 in {0}")]
    InvalidBase64(&'static str),
    #[error("reply is missing `{0}`")]
    MissingField(&'static str),
    #[error("{what} responded with {status}")]
    Status { what: &'static str, status: i64 },
    #[error("{0} timed out")]
    Timeout(&'static str),
}

/// Derive the frame keys from our ephemeral key pair and the phone's secret.
///
/// Layout of `secret`: phone public key (32) | HMAC (32) | encrypted keys (80).
pub fn derive_keys(keypair: &KeyPair, secret: &[u8]) -> Result<SessionKeys, LoginError> {
    if secret.len() != SECRET_LEN {
        return Err(LoginError::InvalidSecretLength(secret.len()));
    }

    let mut their_public = [0u8; 32];
    their_public.copy_from_slice(&secret[..32]);
    let shared = keypair.dh(&their_public);
    let expanded = hkdf_sha256(&shared, None, b"", 80)?;

    let mut signed = Vec::with_capacity(112);
    signed.extend_from_slice(&secret[..32]);
    signed.extend_from_slice(&secret[64..]);
    if !verify_hmac_sha256(&expanded[32..64], &signed, &secret[32..64]) {
        return Err(LoginError::SecretMismatch);
    }

    let mut encrypted = Vec::with_capacity(96);
    encrypted.extend_from_slice(&expanded[64..80]);
    encrypted.extend_from_slice(&secret[64..]);
    let plain = cbc_decrypt(&expanded[..32], None, &encrypted)?;
    if plain.len() != 64 {
        return Err(LoginError::KeyDecryption(CryptoError::InvalidPadding));
    }

    let mut keys = SessionKeys {
        enc_key: [0; 32],
        mac_key: [0; 32],
    };
    keys.enc_key.copy_from_slice(&plain[..32]);
    keys.mac_key.copy_from_slice(&plain[32..]);
    Ok(keys)
}

/// Answer to a restore challenge: base64(HMAC-SHA256(mac_key, base64dec(challenge))).
pub fn answer_challenge(mac_key: &[u8], challenge: &str) -> Result<String, LoginError> {
    let decoded = STANDARD
        .decode(challenge)
        .map_err(|_| LoginError::InvalidBase64("challenge"))?;
    Ok(STANDARD.encode(hmac_sha256(mac_key, &[&decoded])))
}
