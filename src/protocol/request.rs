//! Request/response correlation.
//!
//! Every request frame carries a tag; the reply comes back under the same
//! tag. Listeners are registered before the request is written and removed
//! exactly once, by delivery or when their [`PendingReply`] goes away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::oneshot;

struct Listener {
    id: u64,
    tx: oneshot::Sender<Vec<u8>>,
}

/// Tag to one-shot reply channel registry.
#[derive(Default)]
pub struct Correlator {
    pending: RwLock<HashMap<String, Listener>>,
    next_id: AtomicU64,
}

/// Why a reply never arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyError {
    /// Nothing arrived within the timeout.
    Timeout,
    /// The listener was dropped, replaced or cleared before delivery.
    Closed,
}

impl Correlator {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener for `tag`. A listener already waiting on the same
    /// tag is replaced and its waiter sees [`ReplyError::Closed`].
    pub fn register(self: &Arc<Self>, tag: impl Into<String>) -> PendingReply {
        let tag = tag.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .write()
            .expect("RwLock should not be poisoned")
            .insert(tag.clone(), Listener { id, tx });

        PendingReply {
            tag,
            id,
            rx,
            correlator: Arc::clone(self),
        }
    }

    /// Hand `payload` to the listener of `tag`, removing it. Gives the payload
    /// back when nobody listens.
    pub fn deliver(&self, tag: &str, payload: Vec<u8>) -> Option<Vec<u8>> {
        let listener = self
            .pending
            .write()
            .expect("RwLock should not be poisoned")
            .remove(tag);
        match listener {
            // A waiter that gave up already counts as delivered.
            Some(listener) => {
                let _ = listener.tx.send(payload);
                None
            }
            None => Some(payload),
        }
    }

    pub fn is_pending(&self, tag: &str) -> bool {
        self.pending
            .read()
            .expect("RwLock should not be poisoned")
            .contains_key(tag)
    }

    /// Get count of pending requests.
    pub fn pending_count(&self) -> usize {
        self.pending.read().expect("RwLock should not be poisoned").len()
    }

    /// Drop every listener; their waiters see [`ReplyError::Closed`].
    pub fn clear(&self) {
        self.pending.write().expect("RwLock should not be poisoned").clear();
    }

    fn remove_if(&self, tag: &str, id: u64) {
        let mut pending = self.pending.write().expect("RwLock should not be poisoned");
        if pending.get(tag).is_some_and(|listener| listener.id == id) {
            pending.remove(tag);
        }
    }
}

/// A registered listener waiting for its reply.
pub struct PendingReply {
    tag: String,
    id: u64,
    rx: oneshot::Receiver<Vec<u8>>,
    correlator: Arc<Correlator>,
}

impl PendingReply {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Wait for the reply. On timeout the listener is removed; a reply that
    /// arrives later is treated as unsolicited.
    pub async fn wait(mut self, timeout: Duration) -> Result<Vec<u8>, ReplyError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(ReplyError::Closed),
            Err(_) => Err(ReplyError::Timeout),
        }
    }

    /// Take the reply if it already arrived.
    pub fn try_take(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Withdraw the listener without waiting. Same as dropping it.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.correlator.remove_if(&self.tag, self.id);
    }
}
