//! AES-256-CBC with PKCS#7 padding.
//!
//! Ciphertexts always carry their IV as the first block, so decryption
//! without an explicit IV reads it from the data.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use super::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const BLOCK_SIZE: usize = 16;

/// Encrypt `plaintext`, returning `IV || ciphertext`. A random IV is drawn
/// when none is supplied.
pub fn encrypt(key: &[u8], iv: Option<&[u8; BLOCK_SIZE]>, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let iv = match iv {
        Some(iv) => *iv,
        None => {
            let mut iv = [0u8; BLOCK_SIZE];
            rand::thread_rng().fill_bytes(&mut iv);
            iv
        }
    };

    let cipher = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| CryptoError::InvalidKeyLength)?;
    let body = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(BLOCK_SIZE + body.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decrypt `data`. Without an explicit IV the first block of `data` is the IV.
pub fn decrypt(key: &[u8], iv: Option<&[u8; BLOCK_SIZE]>, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (iv, body) = match iv {
        Some(iv) => (&iv[..], data),
        None => {
            if data.len() < BLOCK_SIZE {
                return Err(CryptoError::CiphertextTooShort(data.len()));
            }
            data.split_at(BLOCK_SIZE)
        }
    };
    if body.is_empty() || body.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::CiphertextTooShort(body.len()));
    }

    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidKeyLength)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| CryptoError::InvalidPadding)
}
