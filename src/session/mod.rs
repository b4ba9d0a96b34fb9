//! Session state negotiated during login.
//!
//! A [`Session`] is what the caller persists between runs to restore a
//! connection without scanning a new QR code. [`Info`] describes the phone
//! the session is bound to.

mod keys;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use keys::{answer_challenge, derive_keys, LoginError, SessionKeys, SECRET_LEN};
#[cfg(test)]
pub(crate) use keys::tests::phone_secret;

/// Persisted credentials of a logged-in web session.
///
/// Field names follow the JSON layout used by existing session files, so a
/// file written by another client of this protocol can be loaded as is.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Session {
    pub client_id: String,
    pub client_token: String,
    pub server_token: String,
    #[serde(with = "base64_bytes")]
    pub enc_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub mac_key: Vec<u8>,
    pub wid: String,
}

impl Session {
    /// Frame keys, when both are present with the right length.
    pub fn keys(&self) -> Option<SessionKeys> {
        Some(SessionKeys {
            enc_key: self.enc_key.as_slice().try_into().ok()?,
            mac_key: self.mac_key.as_slice().try_into().ok()?,
        })
    }

    /// Whether any key material has been installed.
    pub fn has_key_material(&self) -> bool {
        !self.enc_key.is_empty() || !self.mac_key.is_empty()
    }

    pub(crate) fn set_keys(&mut self, keys: &SessionKeys) {
        self.enc_key = keys.enc_key.to_vec();
        self.mac_key = keys.mac_key.to_vec();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("client_token", &"[REDACTED]")
            .field("server_token", &"[REDACTED]")
            .field("keys", &self.keys().is_some())
            .field("wid", &self.wid)
            .finish()
    }
}

/// Phone details sent with the connection info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneInfo {
    pub mcc: String,
    pub mnc: String,
    pub os_version: String,
    pub device_manufacturer: String,
    pub device_model: String,
    pub os_build_number: String,
    pub wa_version: String,
}

/// Connection info the phone sends after login and restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Info {
    pub battery: f64,
    pub platform: String,
    pub connected: bool,
    pub pushname: String,
    pub wid: String,
    pub lc: String,
    pub phone: PhoneInfo,
    pub plugged: bool,
    pub tos: f64,
    pub lg: String,
    pub is24h: bool,
}

impl Info {
    /// Decode the loosely typed info object. Missing or mistyped fields fall
    /// back to their defaults.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|err| {
            log::warn!("Connection info did not decode cleanly: {err}");
            let field = |key: &str| value.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
            Self {
                wid: field("wid"),
                pushname: field("pushname"),
                platform: field("platform"),
                ..Self::default()
            }
        })
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
