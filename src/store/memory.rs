//! In-memory contact and chat store.
//!
//! Contact and chat lists pushed by the phone are kept here so callers can
//! look them up without issuing another query.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{Chat, Contact, Event};

/// Latest contacts and chats keyed by JID.
#[derive(Default)]
pub struct Store {
    contacts: RwLock<HashMap<String, Contact>>,
    chats: RwLock<HashMap<String, Chat>>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an event into the store. Returns whether anything changed.
    pub fn apply(&self, event: &Event) -> bool {
        match event {
            Event::ContactList(contacts) => {
                self.put_contacts(contacts.iter().cloned());
                true
            }
            Event::NewContact(contact) => {
                self.put_contacts(std::iter::once(contact.clone()));
                true
            }
            Event::ChatList(chats) => {
                let mut map = self.chats.write().expect("RwLock should not be poisoned");
                for chat in chats {
                    map.insert(chat.jid.clone(), chat.clone());
                }
                true
            }
            _ => false,
        }
    }

    fn put_contacts(&self, contacts: impl Iterator<Item = Contact>) {
        let mut map = self.contacts.write().expect("RwLock should not be poisoned");
        for contact in contacts {
            map.insert(contact.jid.clone(), contact);
        }
    }

    /// Look up a contact by its normalised JID.
    pub fn contact(&self, jid: &str) -> Option<Contact> {
        self.contacts
            .read()
            .expect("RwLock should not be poisoned")
            .get(jid)
            .cloned()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.contacts
            .read()
            .expect("RwLock should not be poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn chat(&self, jid: &str) -> Option<Chat> {
        self.chats
            .read()
            .expect("RwLock should not be poisoned")
            .get(jid)
            .cloned()
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.chats
            .read()
            .expect("RwLock should not be poisoned")
            .values()
            .cloned()
            .collect()
    }
}
