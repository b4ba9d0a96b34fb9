//! Event types delivered to registered handlers.
//!
//! Push messages the server sends without a matching request are decoded
//! into these shapes, as are connection-level errors.

use std::sync::Arc;

use crate::binary::{Attrs, Node};
use crate::conn::ConnError;

/// A contact entry from a contact list or a `user` action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    /// Normalised JID (`@s.whatsapp.net`)
    pub jid: String,
    /// Push name announced by the contact
    pub notify: String,
    /// Address book name
    pub name: String,
    /// Short address book name
    pub short: String,
}

/// A chat entry from a chat list response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chat {
    pub jid: String,
    pub name: String,
    /// Unread message count
    pub unread: u32,
    /// Unix seconds of the last message
    pub last_message_time: i64,
    /// Mute expiration as sent by the server (`0` when not muted)
    pub muted: String,
    pub marked_spam: bool,
}

/// Phone battery state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatteryMessage {
    pub plugged: bool,
    pub powersave: bool,
    /// Charge in percent
    pub value: u8,
}

/// A `message` node from an `action` push. The payload is kept opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub attrs: Attrs,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub(crate) fn from_node(node: &Node) -> Self {
        Self {
            attrs: node.attrs.clone(),
            payload: node.get_bytes().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }
}

/// All events that can reach a handler.
#[derive(Debug, Clone)]
pub enum Event {
    /// Text frame that no request was waiting for
    Json(String),
    Message(RawMessage),
    Battery(BatteryMessage),
    NewContact(Contact),
    ContactList(Vec<Contact>),
    ChatList(Vec<Chat>),
    /// Connection-level error; fatal ones have already torn the connection down
    Error(Arc<ConnError>),
}

/// Discriminant of [`Event`], used for handler capability masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Json,
    Message,
    Battery,
    NewContact,
    ContactList,
    ChatList,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Json,
        EventKind::Message,
        EventKind::Battery,
        EventKind::NewContact,
        EventKind::ContactList,
        EventKind::ChatList,
        EventKind::Error,
    ];

    pub(crate) fn bit(self) -> u16 {
        1 << self as u16
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Json(_) => EventKind::Json,
            Event::Message(_) => EventKind::Message,
            Event::Battery(_) => EventKind::Battery,
            Event::NewContact(_) => EventKind::NewContact,
            Event::ContactList(_) => EventKind::ContactList,
            Event::ChatList(_) => EventKind::ChatList,
            Event::Error(_) => EventKind::Error,
        }
    }
}
