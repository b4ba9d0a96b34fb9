use std::sync::Arc;

use chrono::{TimeZone, Utc};
use log::{debug, warn};
use tokio::sync::watch;

use super::{Conn, ConnError};
use crate::socket::frame::{KEEPALIVE_PING, KEEPALIVE_TAG};
use crate::socket::WireMessage;

impl Conn {
    /// Ping the server at a random interval until shutdown.
    pub(super) async fn keepalive_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        debug!("Keepalive started");
        loop {
            let result = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.send_keepalive() => result,
            };
            if let Err(err) = result {
                warn!("Keepalive failed: {err}");
                self.report_error(err).await;
            }

            let interval = self.config().keepalive_interval();
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("Keepalive stopped");
    }

    /// Send one ping and record the server time from the reply.
    pub(super) async fn send_keepalive(&self) -> Result<(), ConnError> {
        let transport = self.transport()?;
        let reply = {
            let _writer = self.writer.lock().await;
            let reply = self.listeners.register(KEEPALIVE_TAG);
            if let Err(err) = transport.send(WireMessage::Text(KEEPALIVE_PING.to_string())).await {
                reply.cancel();
                return Err(err.into());
            }
            reply
        };

        let payload = reply.wait(self.request_timeout()).await?;
        let millis: i64 = std::str::from_utf8(&payload)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or(ConnError::InvalidServerResponse)?;
        let seen = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or(ConnError::InvalidServerResponse)?;

        *self.server_last_seen.write().expect("RwLock should not be poisoned") = Some(seen);
        Ok(())
    }
}
