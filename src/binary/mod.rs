//! Binary node encoding and decoding for the WhatsApp Web protocol.
//!
//! Every encrypted frame carries one node tree in a compact tag-prefixed
//! format backed by a shared token dictionary.

mod decoder;
mod encoder;
mod node;
pub mod token;

pub use decoder::{decode, DecodeError, Decoder};
pub use encoder::{encode, pack_string, EncodeError, Encoder};
pub use node::*;
