//! Binary decoder for the WhatsApp Web protocol.
//!
//! Decodes the tag-prefixed wire format into [`Node`] trees.

use thiserror::Error;

use super::node::{Attrs, Node, NodeContent};
use super::token::{self, get_double_token, get_token};

/// Error type for decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of data")]
    Eof,
    #[error("unknown list-size tag 0x{0:02x}")]
    UnknownListSizeTag(u8),
    #[error("unexpected stream end")]
    UnexpectedStreamEnd,
    #[error("invalid Node")]
    InvalidNode,
    #[error("invalid string with tag {0}")]
    InvalidStringTag(u8),
    #[error("unknown double token: dict={dict}, index={index}")]
    UnknownDoubleToken { dict: u8, index: u8 },
    #[error("invalid jid pair: {user:?} - {server:?}")]
    InvalidJidPair { user: String, server: String },
    #[error("invalid packed value {value} for tag {tag}")]
    InvalidPackedValue { tag: u8, value: u8 },
    #[error("invalid utf8 in string: {0}")]
    InvalidUtf8(String),
    #[error("nodes nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Deepest node nesting accepted before giving up.
pub const MAX_DEPTH: usize = 256;

/// Binary decoder over a borrowed byte cursor
pub struct Decoder<'a> {
    data: &'a [u8],
    index: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            index: 0,
            depth: 0,
        }
    }

    /// Decode the first node in `data`. Bytes after it are ignored.
    pub fn decode(data: &[u8]) -> Result<Node, DecodeError> {
        Decoder::new(data).read_node()
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.data.get(self.index).ok_or(DecodeError::Eof)?;
        self.index += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.index.checked_add(n).ok_or(DecodeError::Eof)?;
        let bytes = self.data.get(self.index..end).ok_or(DecodeError::Eof)?;
        self.index = end;
        Ok(bytes)
    }

    /// Read a big-endian integer of `bytes` width
    fn read_int(&mut self, bytes: usize) -> Result<usize, DecodeError> {
        let mut result = 0usize;
        for _ in 0..bytes {
            result = (result << 8) | self.read_byte()? as usize;
        }
        Ok(result)
    }

    /// 4 bits from the first byte followed by two full bytes
    fn read_int20(&mut self) -> Result<usize, DecodeError> {
        let raw = self.read_bytes(3)?;
        Ok(((raw[0] as usize & 0x0F) << 16) | ((raw[1] as usize) << 8) | raw[2] as usize)
    }

    fn read_list_size(&mut self, tag: u8) -> Result<usize, DecodeError> {
        match tag {
            token::LIST_EMPTY => Ok(0),
            token::LIST_8 => Ok(self.read_byte()? as usize),
            token::LIST_16 => self.read_int(2),
            _ => Err(DecodeError::UnknownListSizeTag(tag)),
        }
    }

    /// Length prefix of a binary run introduced by `tag`
    fn read_binary_len(&mut self, tag: u8) -> Result<usize, DecodeError> {
        match tag {
            token::BINARY_8 => Ok(self.read_byte()? as usize),
            token::BINARY_20 => self.read_int20(),
            token::BINARY_32 => self.read_int(4),
            _ => Err(DecodeError::InvalidStringTag(tag)),
        }
    }

    fn read_utf8(&mut self, len: usize) -> Result<String, DecodeError> {
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))
    }

    /// Resolve a string tag
    pub(crate) fn read_string(&mut self, tag: u8) -> Result<String, DecodeError> {
        if token::is_single_byte_token(tag) {
            let tok = get_token(tag).ok_or(DecodeError::InvalidStringTag(tag))?;
            if tok == token::USER_SERVER {
                return Ok(token::LEGACY_USER_SERVER.to_string());
            }
            return Ok(tok.to_string());
        }

        match tag {
            token::DICTIONARY_0..=token::DICTIONARY_3 => {
                let dict = tag - token::DICTIONARY_0;
                let index = self.read_byte()?;
                get_double_token(dict, index)
                    .map(str::to_string)
                    .ok_or(DecodeError::UnknownDoubleToken { dict, index })
            }
            token::LIST_EMPTY => Ok(String::new()),
            token::BINARY_8 | token::BINARY_20 | token::BINARY_32 => {
                let len = self.read_binary_len(tag)?;
                self.read_utf8(len)
            }
            token::JID_PAIR => {
                let user_tag = self.read_byte()?;
                let user = self.read_string(user_tag)?;
                let server_tag = self.read_byte()?;
                let server = self.read_string(server_tag)?;
                if user.is_empty() || server.is_empty() {
                    return Err(DecodeError::InvalidJidPair { user, server });
                }
                Ok(format!("{user}@{server}"))
            }
            token::NIBBLE_8 | token::HEX_8 => self.read_packed8(tag),
            _ => Err(DecodeError::InvalidStringTag(tag)),
        }
    }

    /// Two characters per byte; the high bit of the header drops the final
    /// character of odd-length strings.
    fn read_packed8(&mut self, tag: u8) -> Result<String, DecodeError> {
        let start = self.read_byte()?;
        let count = (start & 0x7F) as usize;
        let mut out = String::with_capacity(count * 2);

        for _ in 0..count {
            let b = self.read_byte()?;
            out.push(unpack(tag, b >> 4)?);
            out.push(unpack(tag, b & 0x0F)?);
        }

        if start >> 7 != 0 {
            out.pop();
        }
        Ok(out)
    }

    fn read_attributes(&mut self, count: usize) -> Result<Attrs, DecodeError> {
        let mut attrs = Attrs::with_capacity(count);
        for _ in 0..count {
            let key_tag = self.read_byte()?;
            let key = self.read_string(key_tag)?;
            let value_tag = self.read_byte()?;
            let value = self.read_string(value_tag)?;
            attrs.insert(key, value);
        }
        Ok(attrs)
    }

    fn read_list(&mut self, tag: u8) -> Result<Vec<Node>, DecodeError> {
        let size = self.read_list_size(tag)?;
        let mut children = Vec::with_capacity(size.min(self.data.len()));
        for _ in 0..size {
            children.push(self.read_node()?);
        }
        Ok(children)
    }

    fn read_content(&mut self) -> Result<NodeContent, DecodeError> {
        let tag = self.read_byte()?;
        match tag {
            token::LIST_EMPTY | token::LIST_8 | token::LIST_16 => {
                Ok(NodeContent::Children(self.read_list(tag)?))
            }
            token::BINARY_8 | token::BINARY_20 | token::BINARY_32 => {
                let len = self.read_binary_len(tag)?;
                Ok(NodeContent::Bytes(self.read_bytes(len)?.to_vec()))
            }
            _ => Ok(NodeContent::Text(self.read_string(tag)?)),
        }
    }

    /// Read a node
    pub fn read_node(&mut self) -> Result<Node, DecodeError> {
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let node = self.read_node_body();
        self.depth -= 1;
        node
    }

    fn read_node_body(&mut self) -> Result<Node, DecodeError> {
        let size_tag = self.read_byte()?;
        let list_size = self.read_list_size(size_tag)?;

        let description_tag = self.read_byte()?;
        if description_tag == token::STREAM_END {
            return Err(DecodeError::UnexpectedStreamEnd);
        }
        let description = self.read_string(description_tag)?;
        if list_size == 0 || description.is_empty() {
            return Err(DecodeError::InvalidNode);
        }

        let attrs = self.read_attributes((list_size - 1) >> 1)?;

        let content = if list_size % 2 == 1 {
            NodeContent::Empty
        } else {
            self.read_content()?
        };

        Ok(Node {
            description,
            attrs,
            content,
        })
    }
}

fn unpack(tag: u8, value: u8) -> Result<char, DecodeError> {
    let c = match (tag, value) {
        (_, 0..=9) => (b'0' + value) as char,
        (token::NIBBLE_8, 10) => '-',
        (token::NIBBLE_8, 11) => '.',
        (token::NIBBLE_8, 15) => '\0',
        (token::HEX_8, 10..=15) => (b'A' + value - 10) as char,
        _ => return Err(DecodeError::InvalidPackedValue { tag, value }),
    };
    Ok(c)
}

/// Decode binary data into a node
pub fn decode(data: &[u8]) -> Result<Node, DecodeError> {
    Decoder::decode(data)
}
