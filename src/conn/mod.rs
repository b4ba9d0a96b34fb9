//! Connection to WhatsApp Web.
//!
//! [`Conn`] owns the socket, the negotiated [`Session`], the reply correlator
//! and the handler registry. Two background tasks run while connected: the
//! read pump, which delivers replies and dispatches push messages, and the
//! keepalive loop. Both stop when the shutdown signal fires.

mod error;
mod keepalive;
mod login;
mod query;
mod read;
mod write;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ConnConfig;
use crate::protocol::{Correlator, FnHandler, Handler, HandlerId, HandlerRegistry};
use crate::session::{Info, Session, SessionKeys};
use crate::socket::{Transport, TransportFactory, WsTransportFactory};
use crate::store::Store;
use crate::types::Event;

pub use error::ConnError;
pub use query::Query;

/// Tag of the connection info pushed after a QR scan or a restore.
pub(crate) const LOGIN_TAG: &str = "s1";
/// Tag of the connection info pushed after a solved challenge.
pub(crate) const CHALLENGE_TAG: &str = "s2";
/// Binary frames held back while a login derives its keys.
const HANDSHAKE_BACKLOG: usize = 256;

/// A WhatsApp Web client connection.
pub struct Conn {
    config: RwLock<ConnConfig>,
    factory: Arc<dyn TransportFactory>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Serialises tag assignment with the socket write.
    writer: tokio::sync::Mutex<()>,
    msg_count: AtomicU64,
    listeners: Arc<Correlator>,
    handlers: HandlerRegistry,
    store: Store,
    session: RwLock<Option<Session>>,
    /// `Some` while a QR login is between scan and key installation; holds
    /// binary frames that arrive before the keys do.
    handshake: tokio::sync::Mutex<Option<Vec<Vec<u8>>>>,
    info: RwLock<Option<Info>>,
    server_last_seen: RwLock<Option<DateTime<Utc>>>,
    connected: AtomicBool,
    logged_in: AtomicBool,
    session_busy: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Held for the duration of a login or restore.
struct SessionOpGuard<'a>(&'a AtomicBool);

impl Drop for SessionOpGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Conn {
    /// Create a disconnected client that dials over WebSocket.
    pub fn new(config: ConnConfig) -> Arc<Self> {
        Self::with_factory(config, Arc::new(WsTransportFactory))
    }

    /// Create a disconnected client using a custom transport.
    pub fn with_factory(config: ConnConfig, factory: Arc<dyn TransportFactory>) -> Arc<Self> {
        let handlers = HandlerRegistry::new(config.handler_workers, config.handler_queue_capacity);
        Arc::new(Self {
            config: RwLock::new(config),
            factory,
            transport: RwLock::new(None),
            writer: tokio::sync::Mutex::new(()),
            msg_count: AtomicU64::new(0),
            listeners: Correlator::new(),
            handlers,
            store: Store::new(),
            session: RwLock::new(None),
            handshake: tokio::sync::Mutex::new(None),
            info: RwLock::new(None),
            server_last_seen: RwLock::new(None),
            connected: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            session_busy: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    /// Dial the server and start the background tasks.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ConnError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(ConnError::AlreadyConnected);
        }

        let config = self.config();
        let (transport, events) = match self.factory.create_transport(&config).await {
            Ok(pair) => pair,
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(ConnError::ConnectionFailed(err));
            }
        };
        *self.transport.write().expect("RwLock should not be poisoned") = Some(transport);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown.lock().expect("Mutex should not be poisoned") = Some(shutdown_tx);
        self.handlers.start_workers();

        let mut tasks = self.tasks.lock().await;
        tasks.clear();
        tasks.push(tokio::spawn(Arc::clone(self).read_pump(events, shutdown_rx.clone())));
        if config.keepalive {
            tasks.push(tokio::spawn(Arc::clone(self).keepalive_loop(shutdown_rx)));
        }

        info!("Connected to {}", config.endpoint);
        Ok(())
    }

    /// Stop the background tasks and close the socket. The session is kept
    /// and returned so it can be persisted or restored later.
    ///
    /// Must not be called from a synchronous handler.
    pub async fn disconnect(&self) -> Result<Option<Session>, ConnError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Err(ConnError::NotConnected);
        }
        self.logged_in.store(false, Ordering::SeqCst);
        self.signal_shutdown();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(err) = task.await {
                warn!("Background task ended abnormally: {err}");
            }
        }
        self.close_transport().await;

        info!("Disconnected");
        Ok(self.session())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    /// Current session, if one was created or installed.
    pub fn session(&self) -> Option<Session> {
        self.session.read().expect("RwLock should not be poisoned").clone()
    }

    /// Phone info from the last login or restore.
    pub fn info(&self) -> Option<Info> {
        self.info.read().expect("RwLock should not be poisoned").clone()
    }

    /// Server time reported by the last keepalive reply.
    pub fn server_last_seen(&self) -> Option<DateTime<Utc>> {
        *self.server_last_seen.read().expect("RwLock should not be poisoned")
    }

    /// Contacts and chats pushed during this connection.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> ConnConfig {
        self.config.read().expect("RwLock should not be poisoned").clone()
    }

    /// Register a handler for push messages and connection errors.
    pub fn add_handler(&self, handler: Arc<dyn Handler>) -> HandlerId {
        self.handlers.add(handler)
    }

    /// Register a closure as an asynchronous handler for every event.
    pub fn add_event_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.handlers.add(Arc::new(FnHandler(handler)))
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.handlers.remove(id)
    }

    pub fn remove_handlers(&self) {
        self.handlers.clear();
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.config.read().expect("RwLock should not be poisoned").request_timeout()
    }

    pub(crate) fn session_keys(&self) -> Option<SessionKeys> {
        self.session
            .read()
            .expect("RwLock should not be poisoned")
            .as_ref()
            .and_then(Session::keys)
    }

    pub(crate) fn transport(&self) -> Result<Arc<dyn Transport>, ConnError> {
        let transport = self.transport.read().expect("RwLock should not be poisoned").clone();
        match transport {
            Some(transport) => Ok(transport),
            None if self.is_connected() => Err(ConnError::InvalidWebsocket),
            None => Err(ConnError::NotConnected),
        }
    }

    async fn ensure_connected(self: &Arc<Self>) -> Result<(), ConnError> {
        match self.connect().await {
            Ok(()) | Err(ConnError::AlreadyConnected) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn begin_session_op(&self) -> Result<SessionOpGuard<'_>, ConnError> {
        self.session_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ConnError::LoginInProgress)?;
        Ok(SessionOpGuard(&self.session_busy))
    }

    fn signal_shutdown(&self) {
        if let Some(tx) = self.shutdown.lock().expect("Mutex should not be poisoned").take() {
            let _ = tx.send(true);
        }
    }

    async fn close_transport(&self) {
        let transport = self.transport.write().expect("RwLock should not be poisoned").take();
        if let Some(transport) = transport {
            transport.disconnect().await;
        }
        self.listeners.clear();
    }

    /// Tear the connection down from inside a background task.
    async fn connection_lost(&self, err: ConnError) {
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!("Connection lost: {err}");
            self.logged_in.store(false, Ordering::SeqCst);
            self.signal_shutdown();
            self.close_transport().await;
        }
        self.report_error(err).await;
    }

    /// Broadcast an error to the handlers.
    async fn report_error(&self, err: ConnError) {
        debug!("Reporting error to handlers: {err}");
        self.handlers.dispatch(Event::Error(Arc::new(err))).await;
    }

    #[cfg(test)]
    pub(crate) fn install_session(&self, session: Session, logged_in: bool) {
        *self.session.write().expect("RwLock should not be poisoned") = Some(session);
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }
}
