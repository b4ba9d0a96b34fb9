use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::sync::{mpsc, watch};

use super::{Conn, ConnError, HANDSHAKE_BACKLOG};
use crate::binary::Node;
use crate::protocol::dispatch::route_node;
use crate::session::SessionKeys;
use crate::socket::frame::{open_binary_payload, split_frame};
use crate::socket::{SocketError, TransportEvent, WireMessage};
use crate::types::Event;

impl Conn {
    /// Read frames until shutdown or a fatal error.
    pub(super) async fn read_pump(
        self: Arc<Self>,
        mut events: mpsc::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("Read pump started");
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = events.recv() => event,
            };

            let failure = match event {
                Some(TransportEvent::Message(message)) => match self.handle_message(message).await {
                    Ok(()) => continue,
                    Err(err) if err.is_fatal() => err,
                    Err(err) => {
                        warn!("Dropping inbound frame: {err}");
                        self.report_error(err).await;
                        continue;
                    }
                },
                Some(TransportEvent::Closed { code, reason }) => ConnError::ConnectionClosed { code, text: reason },
                Some(TransportEvent::Error(err)) => ConnError::ConnectionFailed(SocketError::ConnectionFailed(err)),
                None => ConnError::ConnectionFailed(SocketError::Closed),
            };
            self.connection_lost(failure).await;
            break;
        }
        debug!("Read pump stopped");
    }

    async fn handle_message(&self, message: WireMessage) -> Result<(), ConnError> {
        let Some((tag, payload)) = split_frame(message.as_bytes())? else {
            trace!("<-- ack");
            return Ok(());
        };
        trace!("<-- {tag} ({} bytes)", payload.len());

        let Some(payload) = self.listeners.deliver(&tag, payload.to_vec()) else {
            return Ok(());
        };

        if message.is_binary() {
            let keys = {
                let mut backlog = self.handshake.lock().await;
                match (self.session_keys(), backlog.as_mut()) {
                    (Some(keys), _) => keys,
                    (None, Some(held)) if held.len() < HANDSHAKE_BACKLOG => {
                        trace!("Holding binary frame until login installs keys");
                        held.push(payload);
                        return Ok(());
                    }
                    (None, _) => return Err(ConnError::InvalidWsState),
                }
            };
            self.open_and_dispatch(&keys, &payload).await?;
        } else {
            let json = String::from_utf8_lossy(&payload).into_owned();
            self.handlers.dispatch(Event::Json(json)).await;
        }
        Ok(())
    }

    pub(super) async fn open_and_dispatch(&self, keys: &SessionKeys, payload: &[u8]) -> Result<(), ConnError> {
        let node = open_binary_payload(keys, payload)?;
        self.dispatch_node(node).await;
        Ok(())
    }

    /// Update the store and notify handlers for every event in `node`.
    pub(super) async fn dispatch_node(&self, node: Node) {
        for event in route_node(&node) {
            self.store.apply(&event);
            self.handlers.dispatch(event).await;
        }
    }
}
