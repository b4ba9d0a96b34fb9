//! Protocol plumbing above the frame layer.
//!
//! Reply correlation, handler dispatch and routing of push messages.

pub mod dispatch;
mod handler;
pub mod qr;
mod request;

pub use handler::{FnHandler, Handler, HandlerId, HandlerRegistry};
pub use request::{Correlator, PendingReply, ReplyError};
