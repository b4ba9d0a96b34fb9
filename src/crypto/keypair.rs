//! Curve25519 key pairs for the login key agreement.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use x25519_dalek::{PublicKey, StaticSecret};

/// Ephemeral key pair offered to the phone in the login QR code.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    pub public: [u8; 32],
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(rand::thread_rng()))
    }

    /// Rebuild a key pair from a stored private key. Clamping is applied by
    /// the scalar multiplication.
    pub fn from_private_key(private: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(private))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret).to_bytes();
        Self { secret, public }
    }

    /// Public key in the standard base64 alphabet, as embedded in the QR payload.
    pub fn public_base64(&self) -> String {
        STANDARD.encode(self.public)
    }

    /// X25519 shared secret with the peer's public key.
    pub fn dh(&self, their_public: &[u8; 32]) -> [u8; 32] {
        self.secret
            .diffie_hellman(&PublicKey::from(*their_public))
            .to_bytes()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_hex(s: &str) -> [u8; 32] {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_rfc7748_agreement() {
        let alice = KeyPair::from_private_key(from_hex(
            "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a",
        ));
        let bob = KeyPair::from_private_key(from_hex(
            "5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb",
        ));

        assert_eq!(
            hex::encode(alice.public),
            "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a"
        );
        let shared = "4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742";
        assert_eq!(hex::encode(alice.dh(&bob.public)), shared);
        assert_eq!(hex::encode(bob.dh(&alice.public)), shared);
    }

    #[test]
    fn test_generated_pairs_differ() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public, b.public);
        assert_eq!(STANDARD.decode(a.public_base64()).unwrap(), a.public);
    }

    #[test]
    fn test_debug_shows_public_only() {
        let kp = KeyPair::from_private_key([9u8; 32]);
        let printed = format!("{kp:?}");
        assert!(printed.contains(&hex::encode(kp.public)));
        assert!(!printed.contains(&hex::encode([9u8; 32])));
    }
}
