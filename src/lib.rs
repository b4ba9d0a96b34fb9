//! waweb-rust: client for the legacy WhatsApp Web protocol
//!
//! A browser-style client that links to a phone by QR code, restores saved
//! sessions, and exchanges encrypted binary nodes over a WebSocket.
//!
//! ## Modules
//!
//! - `binary` - Binary node encoding/decoding
//! - `crypto` - AES-CBC, HMAC-SHA256, HKDF and Curve25519 primitives
//! - `socket` - WebSocket transport and frame layout
//! - `protocol` - Reply correlation, handler registry, push routing and QR payloads
//! - `session` - Persisted session and login key derivation
//! - `conn` - The connection: login, restore, queries and background tasks
//! - `store` - Contacts and chats seen on the connection
//! - `types` - Events and JID normalisation
//! - `config` - Connection configuration

pub mod binary;
pub mod config;
pub mod conn;
pub mod crypto;
pub mod protocol;
pub mod session;
pub mod socket;
pub mod store;
pub mod types;

pub use binary::{decode, encode, Node};
pub use config::ConnConfig;
pub use conn::{Conn, ConnError, Query};
pub use protocol::qr::{render_qr_ascii, QrPayload};
pub use protocol::{FnHandler, Handler, HandlerId};
pub use session::{Info, PhoneInfo, Session};
pub use store::Store;
pub use types::{normalize_user_jid, Event, EventKind};
