//! In-memory transport and helpers for connection tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::Conn;
use crate::config::ConnConfig;
use crate::protocol::Handler;
use crate::session::Session;
use crate::socket::{SocketError, Transport, TransportEvent, TransportFactory, WireMessage};
use crate::types::{Event, EventKind};

type Responder = dyn Fn(&WireMessage) -> Vec<WireMessage> + Send + Sync;

/// Dials transports whose server side is a closure: every sent message is
/// recorded and the closure's replies are fed back as inbound frames.
pub(crate) struct ScriptedFactory {
    responder: Arc<Responder>,
    sent: Arc<Mutex<Vec<WireMessage>>>,
    inbound: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    closed: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
    dials: AtomicUsize,
}

impl ScriptedFactory {
    pub(crate) fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&WireMessage) -> Vec<WireMessage> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Arc::new(responder),
            sent: Arc::default(),
            inbound: Mutex::new(None),
            closed: Arc::default(),
            failing: Arc::default(),
            dials: AtomicUsize::new(0),
        })
    }

    /// A server that never answers.
    pub(crate) fn silent() -> Arc<Self> {
        Self::new(|_| Vec::new())
    }

    pub(crate) fn sent(&self) -> Vec<WireMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message {
                WireMessage::Text(text) => Some(text),
                WireMessage::Binary(_) => None,
            })
            .collect()
    }

    pub(crate) fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every further send fail.
    pub(crate) fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn inbound(&self) -> mpsc::Sender<TransportEvent> {
        self.inbound.lock().unwrap().clone().expect("not dialed yet")
    }

    /// Deliver an unsolicited frame.
    pub(crate) async fn push(&self, message: WireMessage) {
        self.inbound().send(TransportEvent::Message(message)).await.unwrap();
    }

    /// Deliver an unsolicited frame from synchronous code.
    pub(crate) fn push_now(&self, message: WireMessage) {
        self.inbound().try_send(TransportEvent::Message(message)).unwrap();
    }

    /// Close the connection from the server side.
    pub(crate) async fn close(&self, code: u16, reason: &str) {
        let event = TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        };
        self.inbound().send(event).await.unwrap();
    }
}

struct ScriptedTransport {
    responder: Arc<Responder>,
    sent: Arc<Mutex<Vec<WireMessage>>>,
    inbound: mpsc::Sender<TransportEvent>,
    closed: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, message: WireMessage) -> Result<(), SocketError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SocketError::SendFailed("scripted failure".into()));
        }
        let replies = (self.responder)(&message);
        self.sent.lock().unwrap().push(message);
        for reply in replies {
            let _ = self.inbound.send(TransportEvent::Message(reply)).await;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportFactory for ScriptedFactory {
    async fn create_transport(
        &self,
        _config: &ConnConfig,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), SocketError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        *self.inbound.lock().unwrap() = Some(tx.clone());

        let transport = ScriptedTransport {
            responder: Arc::clone(&self.responder),
            sent: Arc::clone(&self.sent),
            inbound: tx,
            closed: Arc::clone(&self.closed),
            failing: Arc::clone(&self.failing),
        };
        Ok((Arc::new(transport), rx))
    }
}

/// Split a text frame into its tag and JSON body.
pub(crate) fn split_text(message: &WireMessage) -> Option<(String, Value)> {
    let WireMessage::Text(text) = message else { return None };
    let (tag, body) = text.split_once(',')?;
    Some((tag.to_string(), serde_json::from_str(body).ok()?))
}

pub(crate) fn text(tag: &str, body: &str) -> WireMessage {
    WireMessage::Text(format!("{tag},{body}"))
}

pub(crate) fn test_config() -> ConnConfig {
    ConnConfig::default()
        .with_keepalive(false)
        .with_request_timeout(Duration::from_secs(2))
        .with_handler_workers(2, 64)
}

pub(crate) fn session_with_keys() -> Session {
    Session {
        client_id: "Y2xpZW50LWlkLTE2Ynl0ZQ==".into(),
        client_token: "client-token".into(),
        server_token: "server-token".into(),
        enc_key: vec![0x11; 32],
        mac_key: vec![0x22; 32],
        wid: "4915100000000@c.us".into(),
    }
}

/// Poll `condition` for up to two seconds.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Synchronous handler recording everything it sees.
#[derive(Clone, Default)]
pub(crate) struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Handler for EventLog {
    fn handle_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn is_synchronous(&self) -> bool {
        true
    }
}

impl EventLog {
    pub(crate) fn attach(conn: &Conn) -> Self {
        let log = Self::default();
        conn.add_handler(Arc::new(log.clone()));
        log
    }

    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(Event::kind).collect()
    }

    pub(crate) fn json(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Json(json) => Some(json.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Error(err) => Some(err.to_string()),
                _ => None,
            })
            .collect()
    }
}
