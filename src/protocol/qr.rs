//! QR code payload for linking a new web session.
//!
//! The phone scans `ref,base64(public key),client id`; rendering the code is
//! up to the caller, [`render_qr_ascii`] covers terminals.

use std::fmt;

use qrcode::{render::unicode, QrCode};
use thiserror::Error;

/// Data encoded in the login QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    /// Reference issued by the server in reply to `admin init`
    pub reference: String,
    /// Base64 of our ephemeral Curve25519 public key
    pub public_key: String,
    /// Base64 client id of the session being created
    pub client_id: String,
}

impl fmt::Display for QrPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.reference, self.public_key, self.client_id)
    }
}

/// QR code errors.
#[derive(Debug, Clone, Error)]
pub enum QRError {
    #[error("QR generation failed: {0}")]
    GenerationFailed(String),
}

/// Render QR code as ASCII for terminal display.
pub fn render_qr_ascii(data: &str) -> Result<String, QRError> {
    let code = QrCode::new(data.as_bytes()).map_err(|e| QRError::GenerationFailed(e.to_string()))?;

    let image = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_layout() {
        let payload = QrPayload {
            reference: "1@abc".into(),
            public_key: "cHVi".into(),
            client_id: "Y2xpZW50".into(),
        };
        assert_eq!(payload.to_string(), "1@abc,cHVi,Y2xpZW50");
    }

    #[test]
    fn test_qr_ascii_render() {
        let result = render_qr_ascii("1@abc,cHVi,Y2xpZW50");
        assert!(!result.unwrap().is_empty());
    }
}
