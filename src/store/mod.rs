//! Storage for data the phone pushes during a session.
//!
//! Session persistence stays with the caller; only contacts and chats are
//! kept here, in memory.

mod memory;

pub use memory::*;
