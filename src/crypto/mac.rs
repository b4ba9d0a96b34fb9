//! HMAC-SHA256 helpers.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Constant-time check of `tag` against HMAC-SHA256(key, data).
pub fn verify_hmac_sha256(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc4231_case_2() {
        let tag = hmac_sha256(b"Jefe", &[b"what do ya want ", b"for nothing?"]);
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(verify_hmac_sha256(b"Jefe", b"what do ya want for nothing?", &tag));
    }

    #[test]
    fn test_verify_rejects_flipped_bit() {
        let mut tag = hmac_sha256(&[1u8; 32], &[b"payload"]);
        tag[5] ^= 0x10;
        assert!(!verify_hmac_sha256(&[1u8; 32], b"payload", &tag));
        assert!(!verify_hmac_sha256(&[1u8; 32], b"payload", &tag[..31]));
    }
}
