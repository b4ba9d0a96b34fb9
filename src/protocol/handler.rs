//! Event handler registry.
//!
//! Handlers declare once, at registration, which event kinds they accept and
//! whether they must run in order on the reading task. Asynchronous handlers
//! run on a fixed pool of workers fed by a bounded queue, so a burst of push
//! messages applies backpressure to the reader instead of spawning without
//! limit.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::types::{Event, EventKind};

/// Receives events from the connection.
pub trait Handler: Send + Sync {
    fn handle_event(&self, event: &Event);

    /// Event kinds this handler wants. Asked once, at registration.
    fn accepts(&self, _kind: EventKind) -> bool {
        true
    }

    /// Synchronous handlers run inline, in registration order, before the
    /// next frame is read. They must not wait on replies from the connection.
    fn is_synchronous(&self) -> bool {
        false
    }
}

/// Adapter turning a closure into an asynchronous handler for every event.
pub struct FnHandler<F>(pub F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle_event(&self, event: &Event) {
        (self.0)(event)
    }
}

/// Identifies a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registered {
    id: HandlerId,
    mask: u16,
    synchronous: bool,
    handler: Arc<dyn Handler>,
}

type Job = (Arc<dyn Handler>, Arc<Event>);

/// Registered handlers plus the worker pool running the asynchronous ones.
pub struct HandlerRegistry {
    handlers: RwLock<Vec<Registered>>,
    next_id: AtomicU64,
    queue: Mutex<Option<mpsc::Sender<Job>>>,
    workers: usize,
    capacity: usize,
}

impl HandlerRegistry {
    pub fn new(workers: usize, capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            queue: Mutex::new(None),
            workers: workers.max(1),
            capacity: capacity.max(1),
        }
    }

    /// Register a handler and compute its capability mask.
    pub fn add(&self, handler: Arc<dyn Handler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mask = EventKind::ALL
            .iter()
            .filter(|kind| handler.accepts(**kind))
            .fold(0, |mask, kind| mask | kind.bit());
        let synchronous = handler.is_synchronous();

        self.handlers
            .write()
            .expect("RwLock should not be poisoned")
            .push(Registered {
                id,
                mask,
                synchronous,
                handler,
            });
        id
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().expect("RwLock should not be poisoned");
        let before = handlers.len();
        handlers.retain(|registered| registered.id != id);
        handlers.len() != before
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.handlers.write().expect("RwLock should not be poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.read().expect("RwLock should not be poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the worker pool unless it is already running. Needs a tokio runtime.
    pub fn start_workers(&self) {
        self.queue();
    }

    fn queue(&self) -> mpsc::Sender<Job> {
        let mut queue = self.queue.lock().expect("Mutex should not be poisoned");
        if let Some(tx) = queue.as_ref() {
            return tx.clone();
        }

        let (tx, rx) = mpsc::channel::<Job>(self.capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker in 0..self.workers {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let job = rx.lock().await.recv().await;
                    let Some((handler, event)) = job else { break };
                    run_handler(handler.as_ref(), &event);
                }
                debug!("Handler worker {worker} stopped");
            });
        }
        *queue = Some(tx.clone());
        tx
    }

    /// Deliver an event to every handler that accepts its kind.
    pub async fn dispatch(&self, event: Event) {
        let bit = event.kind().bit();
        let targets: Vec<(bool, Arc<dyn Handler>)> = self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .iter()
            .filter(|registered| registered.mask & bit != 0)
            .map(|registered| (registered.synchronous, Arc::clone(&registered.handler)))
            .collect();
        if targets.is_empty() {
            return;
        }

        let event = Arc::new(event);
        for (synchronous, handler) in targets {
            if synchronous {
                run_handler(handler.as_ref(), &event);
                continue;
            }
            let queue = self.queue();
            if let Err(mpsc::error::SendError((handler, event))) = queue.send((handler, Arc::clone(&event))).await {
                run_handler(handler.as_ref(), &event);
            }
        }
    }
}

fn run_handler(handler: &dyn Handler, event: &Event) {
    if catch_unwind(AssertUnwindSafe(|| handler.handle_event(event))).is_err() {
        warn!("Handler panicked while handling {:?}", event.kind());
    }
}
