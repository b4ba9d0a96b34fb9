//! Types module for WhatsApp protocol types.
//!
//! Events handed to registered handlers and JID normalisation.

mod events;
mod jid;

pub use events::*;
pub use jid::*;
