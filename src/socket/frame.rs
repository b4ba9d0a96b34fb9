//! Tagged frames on the WebSocket.
//!
//! Every frame is `tag,payload`. Text frames carry JSON; binary frames carry
//! an encrypted node: outbound `metric|flags|hmac|iv|ciphertext`, inbound
//! `hmac|iv|ciphertext`.

use std::ops::BitOr;

use serde::Deserialize;
use thiserror::Error;

use crate::binary::{self, DecodeError, EncodeError, Node};
use crate::crypto::{cbc_decrypt, cbc_encrypt, hmac_sha256, verify_hmac_sha256, CryptoError, BLOCK_SIZE};
use crate::session::SessionKeys;

/// Tag of keepalive replies (`!<millis>`).
pub const KEEPALIVE_TAG: &str = "!";
/// Text frame sent as keepalive ping.
pub const KEEPALIVE_PING: &str = "?,,";

const MAC_LEN: usize = 32;

/// Request classification byte of outbound binary frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Metric {
    DebugLog = 1,
    QueryResume,
    QueryReceipt,
    QueryMedia,
    QueryChat,
    QueryContacts,
    QueryMessages,
    Presence,
    PresenceSubscribe,
    Group,
    Read,
    Chat,
    Received,
    Pic,
    Status,
    Message,
    QueryActions,
    Block,
    QueryGroup,
    QueryPreview,
    QueryEmoji,
    QueryMessageInfo,
    Spam,
    QuerySearch,
    QueryIdentity,
    QueryUrl,
    Profile,
    Contact,
    QueryVcard,
    QueryStatus,
    QueryStatusUpdate,
    PrivacyStatus,
    QueryLiveLocations,
    LiveLocation,
    QueryVname,
    QueryLabels,
    Call,
    QueryCall,
    QueryQuickReplies,
}

/// Acknowledgement flags of outbound binary frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const IGNORE: Flags = Flags(1 << 7);
    pub const ACK_REQUEST: Flags = Flags(1 << 6);
    pub const AVAILABLE: Flags = Flags(1 << 5);
    pub const NOT_AVAILABLE: Flags = Flags(1 << 4);
    pub const EXPIRES: Flags = Flags(1 << 3);
    pub const SKIP_OFFLINE: Flags = Flags(1 << 2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Frame level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame has no tag")]
    MissingTag,
    #[error("message tag too short: {0:?}")]
    ShortTag(String),
    #[error("invalid hmac")]
    InvalidHmac,
    #[error("server responded with {0}")]
    Status(i64),
    #[error("invalid server response")]
    InvalidServerResponse,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Split an inbound frame into tag and payload.
///
/// Keepalive replies start with `!` and have no comma; their payload is the
/// rest of the frame. `None` means a bare ack with nothing after the comma.
pub fn split_frame(data: &[u8]) -> Result<Option<(String, &[u8])>, FrameError> {
    let (tag, payload) = if let Some(rest) = data.strip_prefix(b"!") {
        (KEEPALIVE_TAG.to_string(), rest)
    } else {
        let comma = data.iter().position(|&b| b == b',').ok_or(FrameError::MissingTag)?;
        (String::from_utf8_lossy(&data[..comma]).into_owned(), &data[comma + 1..])
    };

    if payload.is_empty() {
        return Ok(None);
    }
    Ok(Some((tag, payload)))
}

/// Encode and encrypt a node: `HMAC(mac_key, iv|ct) | iv | ct`.
///
/// The IV is all zero, so equal nodes produce equal bytes.
pub fn seal_node(keys: &SessionKeys, node: &Node) -> Result<Vec<u8>, FrameError> {
    let plain = binary::encode(node)?;
    let body = cbc_encrypt(&keys.enc_key, Some(&[0u8; BLOCK_SIZE]), &plain)?;
    let mac = hmac_sha256(&keys.mac_key, &[&body]);

    let mut out = Vec::with_capacity(MAC_LEN + body.len());
    out.extend_from_slice(&mac);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Build an outbound binary frame.
pub fn build_binary_frame(
    tag: &str,
    metric: Metric,
    flags: Flags,
    keys: &SessionKeys,
    node: &Node,
) -> Result<Vec<u8>, FrameError> {
    if tag.len() < 2 {
        return Err(FrameError::ShortTag(tag.to_string()));
    }
    let sealed = seal_node(keys, node)?;

    let mut frame = Vec::with_capacity(tag.len() + 3 + sealed.len());
    frame.extend_from_slice(tag.as_bytes());
    frame.push(b',');
    frame.push(metric as u8);
    frame.push(flags.bits());
    frame.extend_from_slice(&sealed);
    Ok(frame)
}

#[derive(Deserialize)]
struct StatusReply {
    status: i64,
}

/// Authenticate, decrypt and decode the payload of an inbound binary frame.
///
/// Payloads shorter than a MAC plus one byte are plain JSON status objects.
pub fn open_binary_payload(keys: &SessionKeys, payload: &[u8]) -> Result<Node, FrameError> {
    if payload.len() < MAC_LEN + 1 {
        let reply: StatusReply =
            serde_json::from_slice(payload).map_err(|_| FrameError::InvalidServerResponse)?;
        return Err(FrameError::Status(reply.status));
    }

    let (mac, body) = payload.split_at(MAC_LEN);
    if !verify_hmac_sha256(&keys.mac_key, body, mac) {
        return Err(FrameError::InvalidHmac);
    }

    let plain = cbc_decrypt(&keys.enc_key, None, body)?;
    Ok(binary::decode(&plain)?)
}
