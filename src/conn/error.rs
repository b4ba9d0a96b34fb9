use thiserror::Error;

use crate::binary::{DecodeError, EncodeError};
use crate::crypto::CryptoError;
use crate::protocol::ReplyError;
use crate::session::LoginError;
use crate::socket::{FrameError, SocketError};

/// Errors surfaced by [`Conn`](super::Conn).
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("already connected")]
    AlreadyConnected,
    #[error("already logged in")]
    AlreadyLoggedIn,
    #[error("invalid session")]
    InvalidSession,
    #[error("another login or restore is in progress")]
    LoginInProgress,
    #[error("not connected")]
    NotConnected,
    #[error("received invalid websocket data")]
    InvalidWsData,
    #[error("binary frame received without session keys")]
    InvalidWsState,
    #[error("connection timed out")]
    ConnectionTimeout,
    #[error("missing message tag")]
    MissingMessageTag,
    #[error("invalid hmac")]
    InvalidHmac,
    #[error("invalid server response")]
    InvalidServerResponse,
    #[error("server responded with 404")]
    ServerRespondedWith404,
    #[error("server responded with {0}")]
    ServerRespondedWith(i64),
    #[error("invalid websocket")]
    InvalidWebsocket,
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] SocketError),
    #[error("server closed connection, code: {code}, text: {text}")]
    ConnectionClosed { code: u16, text: String },
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnError {
    /// Whether the error breaks the connection. Integrity and transport
    /// failures are fatal; decode, status and timeout errors only fail the
    /// message or request at hand.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnError::InvalidHmac
                | ConnError::InvalidWebsocket
                | ConnError::ConnectionFailed(_)
                | ConnError::ConnectionClosed { .. }
                | ConnError::Socket(_)
        )
    }
}

impl From<FrameError> for ConnError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::MissingTag => ConnError::InvalidWsData,
            FrameError::ShortTag(_) => ConnError::MissingMessageTag,
            FrameError::InvalidHmac => ConnError::InvalidHmac,
            FrameError::Status(404) => ConnError::ServerRespondedWith404,
            FrameError::Status(status) => ConnError::ServerRespondedWith(status),
            FrameError::InvalidServerResponse => ConnError::InvalidServerResponse,
            FrameError::Crypto(e) => ConnError::Crypto(e),
            FrameError::Decode(e) => ConnError::Decode(e),
            FrameError::Encode(e) => ConnError::Encode(e),
        }
    }
}

impl From<ReplyError> for ConnError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::Timeout => ConnError::ConnectionTimeout,
            ReplyError::Closed => ConnError::NotConnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ConnError::InvalidHmac.is_fatal());
        assert!(ConnError::ConnectionClosed { code: 1000, text: String::new() }.is_fatal());
        assert!(ConnError::Socket(SocketError::Closed).is_fatal());
        assert!(!ConnError::Decode(DecodeError::Eof).is_fatal());
        assert!(!ConnError::ServerRespondedWith404.is_fatal());
        assert!(!ConnError::ConnectionTimeout.is_fatal());
    }

    #[test]
    fn test_frame_status_mapping() {
        assert!(matches!(ConnError::from(FrameError::Status(404)), ConnError::ServerRespondedWith404));
        assert!(matches!(ConnError::from(FrameError::Status(401)), ConnError::ServerRespondedWith(401)));
        assert!(matches!(ConnError::from(FrameError::MissingTag), ConnError::InvalidWsData));
    }
}
