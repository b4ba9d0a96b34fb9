use hkdf::Hkdf;
use sha2::Sha256;

use super::CryptoError;

/// HKDF-SHA256. A missing salt is treated as 32 zero bytes.
pub fn hkdf_sha256(ikm: &[u8], salt: Option<&[u8]>, info: &[u8], length: usize) -> Result<Vec<u8>, CryptoError> {
    let mut okm = vec![0u8; length];
    Hkdf::<Sha256>::new(salt, ikm)
        .expand(info, &mut okm)
        .map_err(|_| CryptoError::InvalidOutputLength(length))?;
    Ok(okm)
}
