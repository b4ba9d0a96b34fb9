//! Cryptographic primitives for the WhatsApp Web protocol.
//!
//! The login key agreement (X25519 + HKDF), the HMAC-SHA256 frame
//! authentication and the AES-256-CBC frame encryption.

mod cbc;
mod kdf;
mod keypair;
mod mac;

use thiserror::Error;

pub use self::cbc::{decrypt as cbc_decrypt, encrypt as cbc_encrypt, BLOCK_SIZE};
pub use kdf::hkdf_sha256;
pub use keypair::KeyPair;
pub use mac::{hmac_sha256, verify_hmac_sha256};

/// Cipher errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid key length")]
    InvalidKeyLength,
    #[error("ciphertext has invalid length {0}")]
    CiphertextTooShort(usize),
    #[error("invalid padding")]
    InvalidPadding,
    #[error("cannot expand {0} bytes")]
    InvalidOutputLength(usize),
}
