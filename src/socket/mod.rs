//! WebSocket transport for the WhatsApp Web protocol.
//!
//! The connection talks to a [`Transport`] created by a [`TransportFactory`];
//! the factory also hands back the stream of inbound [`TransportEvent`]s. The
//! production implementation is [`WsTransportFactory`].

pub mod frame;
mod ws;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::ConnConfig;

pub use frame::{Flags, FrameError, Metric};
pub use ws::{WsTransport, WsTransportFactory};

/// One WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WireMessage {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WireMessage::Text(text) => text.as_bytes(),
            WireMessage::Binary(bytes) => bytes,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, WireMessage::Binary(_))
    }
}

/// An event produced by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text or binary message arrived.
    Message(WireMessage),
    /// The peer closed the connection.
    Closed { code: u16, reason: String },
    /// Reading failed; no further events follow.
    Error(String),
}

/// Socket errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("socket is closed")]
    Closed,
}

/// An open connection to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one message.
    async fn send(&self, message: WireMessage) -> Result<(), SocketError>;

    /// Closes the connection. Calling it twice is harmless.
    async fn disconnect(&self);
}

/// Dials new transports.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Opens a transport and returns it along with its inbound event stream.
    async fn create_transport(
        &self,
        config: &ConnConfig,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), SocketError>;
}
