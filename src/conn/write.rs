use std::sync::atomic::Ordering;

use chrono::Utc;
use log::trace;
use serde_json::Value;

use super::{Conn, ConnError};
use crate::binary::Node;
use crate::protocol::PendingReply;
use crate::socket::frame::build_binary_frame;
use crate::socket::{Flags, Metric, WireMessage};

impl Conn {
    /// Send a JSON command under a generated tag.
    pub async fn write_json(&self, value: &Value) -> Result<PendingReply, ConnError> {
        let body = serde_json::to_string(value)?;
        self.write_tagged(None, |tag, _| Ok(WireMessage::Text(format!("{tag},{body}"))))
            .await
    }

    /// Encrypt `node` and send it under `tag`.
    pub async fn write_binary(
        &self,
        node: &Node,
        metric: Metric,
        flags: Flags,
        tag: &str,
    ) -> Result<PendingReply, ConnError> {
        if tag.len() < 2 {
            return Err(ConnError::MissingMessageTag);
        }
        let keys = self.session_keys().ok_or(ConnError::InvalidSession)?;
        self.write_tagged(Some(tag), |tag, _| {
            Ok(WireMessage::Binary(build_binary_frame(tag, metric, flags, &keys, node)?))
        })
        .await
    }

    /// Encrypt and send a node under a generated tag. `build` receives the
    /// message count, which queries carry as their `epoch`.
    pub async fn send_node<F>(&self, metric: Metric, flags: Flags, build: F) -> Result<PendingReply, ConnError>
    where
        F: FnOnce(u64) -> Node,
    {
        let keys = self.session_keys().ok_or(ConnError::InvalidSession)?;
        self.write_tagged(None, |tag, count| {
            let node = build(count);
            Ok(WireMessage::Binary(build_binary_frame(tag, metric, flags, &keys, &node)?))
        })
        .await
    }

    /// Register the reply listener, then write. Tag generation and the write
    /// happen under the writer lock so tags stay unique and ordered.
    async fn write_tagged<F>(&self, tag: Option<&str>, build: F) -> Result<PendingReply, ConnError>
    where
        F: FnOnce(&str, u64) -> Result<WireMessage, ConnError>,
    {
        let transport = self.transport()?;
        let _writer = self.writer.lock().await;

        let count = self.msg_count.load(Ordering::SeqCst);
        let tag = match tag {
            Some(tag) => tag.to_string(),
            None => format!("{}.--{}", Utc::now().timestamp(), count),
        };
        let message = build(&tag, count)?;

        let reply = self.listeners.register(tag.as_str());
        trace!("--> {tag} ({} bytes)", message.as_bytes().len());
        if let Err(err) = transport.send(message).await {
            reply.cancel();
            return Err(err.into());
        }
        self.msg_count.fetch_add(1, Ordering::SeqCst);
        Ok(reply)
    }
}
