//! Binary encoder for the WhatsApp Web protocol.
//!
//! Encodes [`Node`] trees into the tag-prefixed wire format. Attributes are
//! written in key order so identical nodes always produce identical bytes.

use thiserror::Error;

use super::node::{Node, NodeContent};
use super::token::{self, get_double_token_index, get_token_index};

/// Error type for encoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("too many bytes to pack: {0}")]
    PackedTooLong(usize),
    #[error("character {0:?} cannot be packed")]
    Unpackable(char),
    #[error("binary run too long: {0} bytes")]
    BinaryTooLong(usize),
    #[error("list too long: {0} entries")]
    ListTooLong(usize),
}

/// Binary encoder for protocol nodes
pub struct Encoder {
    data: Vec<u8>,
}

impl Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Encode a node and return the binary data
    pub fn encode(node: &Node) -> Result<Vec<u8>, EncodeError> {
        let mut encoder = Self::new();
        encoder.write_node(node)?;
        Ok(encoder.data)
    }

    fn write_byte(&mut self, b: u8) {
        self.data.push(b);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn write_list_start(&mut self, size: usize) -> Result<(), EncodeError> {
        if size == 0 {
            self.write_byte(token::LIST_EMPTY);
        } else if size < 256 {
            self.write_byte(token::LIST_8);
            self.write_byte(size as u8);
        } else {
            let size16 = u16::try_from(size).map_err(|_| EncodeError::ListTooLong(size))?;
            self.write_byte(token::LIST_16);
            self.write_bytes(&size16.to_be_bytes());
        }
        Ok(())
    }

    /// Length prefix for a binary run
    fn write_byte_length(&mut self, len: usize) -> Result<(), EncodeError> {
        if len > i32::MAX as usize {
            return Err(EncodeError::BinaryTooLong(len));
        }
        if len >= 1 << 20 {
            self.write_byte(token::BINARY_32);
            self.write_bytes(&(len as u32).to_be_bytes());
        } else if len >= 256 {
            self.write_byte(token::BINARY_20);
            self.write_byte(((len >> 16) & 0x0F) as u8);
            self.write_byte(((len >> 8) & 0xFF) as u8);
            self.write_byte((len & 0xFF) as u8);
        } else {
            self.write_byte(token::BINARY_8);
            self.write_byte(len as u8);
        }
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.write_byte_length(bytes.len())?;
        self.write_bytes(bytes);
        Ok(())
    }

    /// Write a string as a token, a JID pair or a raw run.
    ///
    /// Outside of content, `c.us` is written as the `s.whatsapp.net` token,
    /// which the decoder reads back as `c.us`.
    fn write_string(&mut self, s: &str, is_content: bool) -> Result<(), EncodeError> {
        if !is_content && s == token::LEGACY_USER_SERVER {
            if let Some(index) = get_token_index(token::USER_SERVER) {
                self.write_byte(index);
                return Ok(());
            }
        }

        if let Some(index) = get_token_index(s) {
            self.write_byte(index);
            return Ok(());
        }

        if let Some((dict, index)) = get_double_token_index(s) {
            self.write_byte(token::DICTIONARY_0 + dict);
            self.write_byte(index);
            return Ok(());
        }

        match s.find('@') {
            Some(sep) if sep >= 1 && sep + 1 < s.len() => self.write_jid(&s[..sep], &s[sep + 1..]),
            _ => self.write_raw(s.as_bytes()),
        }
    }

    /// Write a `user@server` pair. The user half is packed when it fits one
    /// of the packed alphabets and written raw otherwise.
    pub(crate) fn write_jid(&mut self, user: &str, server: &str) -> Result<(), EncodeError> {
        self.write_byte(token::JID_PAIR);

        if user.is_empty() {
            self.write_byte(token::LIST_EMPTY);
        } else {
            match pack_string(user) {
                Ok(packed) => self.write_bytes(&packed),
                Err(_) => self.write_raw(user.as_bytes())?,
            }
        }

        self.write_string(server, false)
    }

    fn write_content(&mut self, content: &NodeContent) -> Result<(), EncodeError> {
        match content {
            NodeContent::Empty => Ok(()),
            NodeContent::Text(text) => self.write_string(text, true),
            NodeContent::Bytes(bytes) => self.write_raw(bytes),
            NodeContent::Children(children) => {
                self.write_list_start(children.len())?;
                for child in children {
                    self.write_node(child)?;
                }
                Ok(())
            }
        }
    }

    /// Write a node
    fn write_node(&mut self, node: &Node) -> Result<(), EncodeError> {
        // Empty attribute values are never sent.
        let mut attrs: Vec<(&String, &String)> =
            node.attrs.iter().filter(|(_, v)| !v.is_empty()).collect();
        attrs.sort_by(|a, b| a.0.cmp(b.0));

        let has_content = usize::from(!node.content.is_empty());
        self.write_list_start(2 * attrs.len() + 1 + has_content)?;

        self.write_string(&node.description, false)?;

        for (key, value) in attrs {
            self.write_string(key, false)?;
            self.write_string(value, false)?;
        }

        self.write_content(&node.content)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pack a string as `NIBBLE_8`, falling back to `HEX_8`.
pub fn pack_string(value: &str) -> Result<Vec<u8>, EncodeError> {
    pack_with(value, token::NIBBLE_8).or_else(|_| pack_with(value, token::HEX_8))
}

fn pack_with(value: &str, tag: u8) -> Result<Vec<u8>, EncodeError> {
    let bytes = value.as_bytes();
    let len = bytes.len();
    if len > token::PACKED_MAX {
        return Err(EncodeError::PackedTooLong(len));
    }

    let mut out = Vec::with_capacity(2 + len.div_ceil(2));
    out.push(tag);
    out.push((((len % 2) as u8) << 7) | len.div_ceil(2) as u8);

    for pair in bytes.chunks(2) {
        let high = pack_char(tag, pair[0])?;
        let low = match pair.get(1) {
            Some(&c) => pack_char(tag, c)?,
            None => pack_char(tag, 0)?,
        };
        out.push((high << 4) | low);
    }
    Ok(out)
}

fn pack_char(tag: u8, c: u8) -> Result<u8, EncodeError> {
    match (tag, c) {
        (_, b'0'..=b'9') => Ok(c - b'0'),
        (_, 0) => Ok(15),
        (token::NIBBLE_8, b'-') => Ok(10),
        (token::NIBBLE_8, b'.') => Ok(11),
        (token::HEX_8, b'A'..=b'F') => Ok(c - b'A' + 10),
        _ => Err(EncodeError::Unpackable(c as char)),
    }
}

/// Encode a node to binary format
pub fn encode(node: &Node) -> Result<Vec<u8>, EncodeError> {
    Encoder::encode(node)
}
