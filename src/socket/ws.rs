use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{SocketError, Transport, TransportEvent, TransportFactory, WireMessage};
use crate::config::ConnConfig;

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

const EVENT_BUFFER: usize = 64;
/// Close frame without a status code.
const NO_STATUS: u16 = 1005;
/// Stream ended without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// WebSocket transport backed by tokio-tungstenite.
pub struct WsTransport {
    sink: Mutex<Option<WsSink>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, message: WireMessage) -> Result<(), SocketError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SocketError::Closed)?;

        let message = match message {
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Binary(bytes) => Message::Binary(bytes),
        };
        trace!("--> {} byte frame", message.len());
        sink.send(message)
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn disconnect(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let close = CloseFrame {
                code: CloseCode::Normal,
                reason: Cow::Borrowed(""),
            };
            if let Err(e) = sink.send(Message::Close(Some(close))).await {
                debug!("Close frame not sent: {e}");
            }
            let _ = sink.close().await;
        }
    }
}

/// Dials the configured endpoint with the configured `Origin` header.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransportFactory;

#[async_trait]
impl TransportFactory for WsTransportFactory {
    async fn create_transport(
        &self,
        config: &ConnConfig,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), SocketError> {
        let mut request = config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| SocketError::InvalidEndpoint(e.to_string()))?;
        let origin = HeaderValue::from_str(&config.origin)
            .map_err(|e| SocketError::InvalidEndpoint(e.to_string()))?;
        request.headers_mut().insert(ORIGIN, origin);

        info!("Dialing {}", config.endpoint);
        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| SocketError::ConnectionFailed(e.to_string()))?;
        let (sink, stream) = ws.split();

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(read_loop(stream, event_tx));

        let transport = Arc::new(WsTransport {
            sink: Mutex::new(Some(sink)),
        });
        Ok((transport, event_rx))
    }
}

async fn read_loop(mut stream: WsStream, event_tx: mpsc::Sender<TransportEvent>) {
    while let Some(message) = stream.next().await {
        let event = match message {
            Ok(Message::Text(text)) => TransportEvent::Message(WireMessage::Text(text)),
            Ok(Message::Binary(bytes)) => TransportEvent::Message(WireMessage::Binary(bytes)),
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.into_owned()))
                    .unwrap_or((NO_STATUS, String::new()));
                let _ = event_tx.send(TransportEvent::Closed { code, reason }).await;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket read failed: {e}");
                let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                return;
            }
        };

        if event_tx.send(event).await.is_err() {
            debug!("Event receiver dropped, stopping WebSocket reader");
            return;
        }
    }

    let _ = event_tx
        .send(TransportEvent::Closed {
            code: ABNORMAL_CLOSURE,
            reason: "stream ended".into(),
        })
        .await;
}
