//! Token dictionary for the WhatsApp Web binary node format.
//!
//! Common protocol strings are sent as a single byte index into a shared
//! dictionary instead of their full text. A handful of byte values are
//! reserved as structural tags (list sizes, binary runs, JID pairs and
//! packed numeric strings).

use std::collections::HashMap;

use lazy_static::lazy_static;

/// Empty list, also used for the empty string.
pub const LIST_EMPTY: u8 = 0;
/// Marks the end of the node stream.
pub const STREAM_END: u8 = 2;
/// First of the four double-byte dictionary tags.
pub const DICTIONARY_0: u8 = 236;
pub const DICTIONARY_1: u8 = 237;
pub const DICTIONARY_2: u8 = 238;
pub const DICTIONARY_3: u8 = 239;
/// List whose size follows as one byte.
pub const LIST_8: u8 = 248;
/// List whose size follows as a big-endian u16.
pub const LIST_16: u8 = 249;
/// `user@server` pair, both halves encoded as strings.
pub const JID_PAIR: u8 = 250;
/// Packed string over the hex alphabet.
pub const HEX_8: u8 = 251;
/// Binary run with a one byte length.
pub const BINARY_8: u8 = 252;
/// Binary run with a 20 bit length.
pub const BINARY_20: u8 = 253;
/// Binary run with a 32 bit length.
pub const BINARY_32: u8 = 254;
/// Packed string over the nibble alphabet.
pub const NIBBLE_8: u8 = 255;

/// Longest string that fits into a packed encoding.
pub const PACKED_MAX: usize = 254;
/// Token indices below this value are written as a single byte.
pub const SINGLE_BYTE_MAX: usize = 256;

/// Server name the decoder rewrites to [`LEGACY_USER_SERVER`].
pub const USER_SERVER: &str = "s.whatsapp.net";
/// Legacy user server used by the web protocol.
pub const LEGACY_USER_SERVER: &str = "c.us";

/// Single-byte tokens. Indices 0-2 are structural and never looked up.
pub static SINGLE_BYTE_TOKENS: &[&str] = &[
    "", "", "", "200", "400", "404", "500", "501", "502", "action", "add",
    "after", "archive", "author", "available", "battery", "before", "body",
    "broadcast", "chat", "clear", "code", "composing", "contacts", "count",
    "create", "debug", "delete", "demote", "duplicate", "encoding", "error",
    "false", "filehash", "from", "g.us", "group", "groups_v2", "height", "id",
    "image", "in", "index", "invis", "item", "jid", "kind", "last", "leave",
    "live", "log", "media", "message", "mimetype", "missing", "modify", "name",
    "notification", "notify", "out", "owner", "participant", "paused",
    "picture", "played", "presence", "preview", "promote", "query", "raw",
    "read", "receipt", "received", "recipient", "recording", "relay",
    "remove", "response", "resume", "retry", "s.whatsapp.net", "seconds",
    "set", "size", "status", "subject", "subscribe", "t", "text", "to", "true",
    "type", "unarchive", "unavailable", "url", "user", "value", "web", "width",
    "mute", "read_only", "admin", "creator", "short", "update", "powersave",
    "checksum", "epoch", "block", "previous", "409", "replaced", "reason",
    "spam", "modify_tag", "message_info", "delivery", "emoji", "title",
    "description", "canonical-url", "matched-text", "star", "unstar",
    "media_key", "filename", "identity", "unread", "page", "page_count",
    "search", "media_message", "security", "call_log", "profile", "ciphertext",
    "invite", "gif", "vcard", "frequent", "privacy", "blacklist", "whitelist",
    "verify", "location", "document", "elapsed", "revoke_invite", "expiration",
    "unsubscribe", "disable", "vname", "old_jid", "new_jid", "announcement",
    "locked", "prop", "label", "color", "call", "offer", "call-id",
    "quick_reply", "sticker", "pay_t", "accept", "reject", "sticker_pack",
    "invalid", "canceled", "missed", "connected", "result", "audio",
    "video", "recent",
];

/// Double-byte dictionaries addressed by `DICTIONARY_k` plus a sub-index.
///
/// The web protocol revision spoken here does not populate them, so every
/// dictionary lookup misses.
pub static DOUBLE_BYTE_TOKENS: [&[&str]; 4] = [&[], &[], &[], &[]];

lazy_static! {
    static ref SINGLE_BYTE_INDEX: HashMap<&'static str, u8> = SINGLE_BYTE_TOKENS
        .iter()
        .enumerate()
        .skip(3)
        .map(|(i, token)| (*token, i as u8))
        .collect();
    static ref DOUBLE_BYTE_INDEX: HashMap<&'static str, (u8, u8)> = DOUBLE_BYTE_TOKENS
        .iter()
        .enumerate()
        .flat_map(|(dict, tokens)| {
            tokens
                .iter()
                .enumerate()
                .map(move |(i, token)| (*token, (dict as u8, i as u8)))
        })
        .collect();
}

/// Look up a single-byte token. Structural indices 0-2 never resolve.
pub fn get_token(index: u8) -> Option<&'static str> {
    if index < 3 {
        return None;
    }
    SINGLE_BYTE_TOKENS.get(index as usize).copied()
}

/// Whether `tag` addresses the single-byte dictionary.
pub fn is_single_byte_token(tag: u8) -> bool {
    tag >= 3 && (tag as usize) < SINGLE_BYTE_TOKENS.len()
}

/// Find the single-byte index of a token.
pub fn get_token_index(token: &str) -> Option<u8> {
    SINGLE_BYTE_INDEX.get(token).copied()
}

/// Look up a double-byte token by dictionary number (0-3) and sub-index.
pub fn get_double_token(dict: u8, index: u8) -> Option<&'static str> {
    DOUBLE_BYTE_TOKENS
        .get(dict as usize)
        .and_then(|tokens| tokens.get(index as usize))
        .copied()
}

/// Find the dictionary number and sub-index of a double-byte token.
pub fn get_double_token_index(token: &str) -> Option<(u8, u8)> {
    DOUBLE_BYTE_INDEX.get(token).copied()
}
