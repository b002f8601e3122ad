//! WebSocket transport
//!
//! Carries the same `[u32 big-endian length][payload]` frames as the TCP
//! transport, wrapped in WebSocket binary messages. One listener task
//! drains the socket into the inbox until the transport stops or the peer
//! closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use converge_core::Message;
use converge_types::{ConvergeError, Result};

use crate::{Transport, MAX_FRAME_BYTES};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket client transport
pub struct WebSocketTransport {
    agent_id: String,
    uri: String,
    inbox_tx: mpsc::UnboundedSender<Message>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    listen_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl WebSocketTransport {
    /// Transport connecting to a WebSocket URI (e.g. `ws://localhost:8765`)
    pub fn new(agent_id: impl Into<String>, uri: impl Into<String>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            agent_id: agent_id.into(),
            uri: uri.into(),
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
            sink: tokio::sync::Mutex::new(None),
            listen_task: tokio::sync::Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    fn ensure_started(&self) -> Result<()> {
        if !self.started.load(Ordering::Acquire) {
            return Err(ConvergeError::not_started("websocket transport"));
        }
        Ok(())
    }

    fn decode_frame(data: &[u8]) -> Option<Message> {
        if data.len() < 4 {
            return None;
        }
        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(&data[..4]);
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_BYTES || data.len() < 4 + len {
            return None;
        }
        Message::from_bytes(&data[4..4 + len]).ok()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn start(&self) -> Result<()> {
        let (socket, _response) = connect_async(self.uri.as_str())
            .await
            .map_err(|e| ConvergeError::transport(format!("connect {}: {e}", self.uri)))?;
        let (sink, mut stream) = socket.split();
        *self.sink.lock().await = Some(sink);

        let inbox = self.inbox_tx.clone();
        let handle = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Binary(data)) => {
                        match WebSocketTransport::decode_frame(&data) {
                            Some(message) => {
                                if inbox.send(message).is_err() {
                                    break;
                                }
                            }
                            None => debug!("skipping malformed websocket frame"),
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "websocket closed");
                        break;
                    }
                }
            }
        });
        *self.listen_task.lock().await = Some(handle);
        self.started.store(true, Ordering::Release);
        debug!(agent_id = %self.agent_id, uri = %self.uri, "websocket transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::Release);
        if let Some(handle) = self.listen_task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        Ok(())
    }

    async fn send(&self, message: &Message) -> Result<()> {
        self.ensure_started()?;
        let data = message.to_bytes()?;
        let mut frame = Vec::with_capacity(4 + data.len());
        frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
        frame.extend_from_slice(&data);

        let mut sink = self.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| ConvergeError::not_started("websocket transport"))?;
        sink.send(WsMessage::Binary(frame))
            .await
            .map_err(|e| ConvergeError::transport(format!("websocket send: {e}")))
    }

    async fn receive(&self, timeout: Option<Duration>) -> Result<Message> {
        self.ensure_started()?;
        let mut inbox = self.inbox_rx.lock().await;
        let next = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, inbox.recv())
                .await
                .map_err(|_| ConvergeError::timeout("transport receive"))?,
            None => inbox.recv().await,
        };
        next.ok_or_else(|| ConvergeError::transport("websocket inbox closed"))
    }
}
