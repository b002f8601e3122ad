//! TCP transport
//!
//! Frames are `[u32 big-endian length][payload]` with a 10 MiB cap; an
//! oversize frame drops the connection without delivery. The payload is the
//! wire serialization of a message.
//!
//! Destinations are read from the first `transport.tcp` topic on the
//! message (`host` and `port` attributes); messages without one are
//! silently dropped. Outbound connections are pooled per `(host, port)`,
//! each entry holding a writer behind its own lock so concurrent senders
//! cannot interleave frames. A write error evicts the entry.
//!
//! TLS is optional and applied symmetrically: the acceptor wraps inbound
//! connections, the connector wraps outbound dials.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::rustls::{ClientConfig, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, warn};

use converge_core::Message;
use converge_types::{ConvergeError, Result};

use crate::Transport;

/// Maximum accepted frame payload
pub const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;
/// Topic namespace carrying TCP routing attributes
pub const TCP_TOPIC_NAMESPACE: &str = "transport.tcp";

/// TLS applied symmetrically to the listener and to outbound dials
#[derive(Clone)]
pub struct TcpTlsConfig {
    /// Server side, wrapped around accepted connections
    pub server: Arc<ServerConfig>,
    /// Client side, wrapped around outbound dials
    pub client: Arc<ClientConfig>,
    /// SNI name presented when dialing peers
    pub server_name: String,
}

struct PoolEntry {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

type PeerKey = (String, u16);

/// Length-prefixed TCP transport with a per-peer connection pool
pub struct TcpTransport {
    host: String,
    port: u16,
    fingerprint: String,
    tls: Option<TcpTlsConfig>,
    inbox_tx: mpsc::UnboundedSender<Message>,
    inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    pool: tokio::sync::Mutex<HashMap<PeerKey, Arc<PoolEntry>>>,
    listener_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl TcpTransport {
    /// Plain TCP transport listening on `host:port`
    pub fn new(host: impl Into<String>, port: u16, fingerprint: impl Into<String>) -> Self {
        Self::with_tls(host, port, fingerprint, None)
    }

    /// TCP transport with optional TLS
    pub fn with_tls(
        host: impl Into<String>,
        port: u16,
        fingerprint: impl Into<String>,
        tls: Option<TcpTlsConfig>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            host: host.into(),
            port,
            fingerprint: fingerprint.into(),
            tls,
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
            pool: tokio::sync::Mutex::new(HashMap::new()),
            listener_task: tokio::sync::Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    fn ensure_started(&self) -> Result<()> {
        if !self.started.load(Ordering::Acquire) {
            return Err(ConvergeError::not_started("tcp transport"));
        }
        Ok(())
    }

    fn destination(message: &Message) -> Option<PeerKey> {
        let topic = message
            .topics
            .iter()
            .find(|t| t.namespace == TCP_TOPIC_NAMESPACE)?;
        let host = topic.attribute_str("host")?.to_string();
        let port = u16::try_from(topic.attribute_u64("port")?).ok()?;
        Some((host, port))
    }

    async fn connection(&self, host: &str, port: u16) -> Result<Arc<PoolEntry>> {
        let mut pool = self.pool.lock().await;
        if let Some(entry) = pool.get(&(host.to_string(), port)) {
            return Ok(Arc::clone(entry));
        }

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| ConvergeError::transport(format!("connect {host}:{port}: {e}")))?;
        let writer: Box<dyn AsyncWrite + Send + Unpin> = match &self.tls {
            Some(tls) => {
                let connector = TlsConnector::from(Arc::clone(&tls.client));
                let name = ServerName::try_from(tls.server_name.clone())
                    .map_err(|e| ConvergeError::invalid_argument(format!("bad TLS server name: {e}")))?;
                let tls_stream = connector
                    .connect(name, stream)
                    .await
                    .map_err(|e| ConvergeError::transport(format!("tls connect {host}:{port}: {e}")))?;
                Box::new(tls_stream)
            }
            None => Box::new(stream),
        };

        let entry = Arc::new(PoolEntry {
            writer: tokio::sync::Mutex::new(writer),
        });
        pool.insert((host.to_string(), port), Arc::clone(&entry));
        Ok(entry)
    }
}

/// Drain length-prefixed frames from a connection into the inbox
///
/// Exits on EOF, an oversize frame, a short read, or a malformed payload.
async fn read_frames<R>(mut reader: R, inbox: mpsc::UnboundedSender<Message>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).await.is_err() {
            break;
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_BYTES {
            warn!(len, "dropping connection: frame exceeds limit");
            break;
        }
        let mut payload = vec![0u8; len];
        if reader.read_exact(&mut payload).await.is_err() {
            break;
        }
        match Message::from_bytes(&payload) {
            Ok(message) => {
                if inbox.send(message).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "dropping connection: malformed frame payload");
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                ConvergeError::transport(format!("bind {}:{}: {e}", self.host, self.port))
            })?;
        let acceptor = self.tls.as_ref().map(|t| TlsAcceptor::from(Arc::clone(&t.server)));
        let inbox = self.inbox_tx.clone();

        let handle = tokio::spawn(async move {
            // Dropping the set on cancellation aborts the per-connection tasks.
            let mut connections = JoinSet::new();
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        let inbox = inbox.clone();
                        match acceptor.clone() {
                            Some(acceptor) => {
                                connections.spawn(async move {
                                    match acceptor.accept(stream).await {
                                        Ok(tls_stream) => read_frames(tls_stream, inbox).await,
                                        Err(e) => debug!(error = %e, "tls accept failed"),
                                    }
                                });
                            }
                            None => {
                                connections.spawn(read_frames(stream, inbox));
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed; listener exiting");
                        break;
                    }
                }
            }
        });

        *self.listener_task.lock().await = Some(handle);
        self.started.store(true, Ordering::Release);
        debug!(
            fingerprint = %self.fingerprint,
            host = %self.host,
            port = self.port,
            "tcp transport started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::Release);
        if let Some(handle) = self.listener_task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        for (_, entry) in self.pool.lock().await.drain() {
            let mut writer = entry.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        Ok(())
    }

    async fn send(&self, message: &Message) -> Result<()> {
        self.ensure_started()?;
        let Some((host, port)) = Self::destination(message) else {
            debug!(id = %message.id, "dropping message without tcp destination topic");
            return Ok(());
        };

        let data = message.to_bytes()?;
        let entry = self.connection(&host, port).await?;

        let write_result = {
            let mut writer = entry.writer.lock().await;
            async {
                writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
                writer.write_all(&data).await?;
                writer.flush().await
            }
            .await
        };

        if let Err(e) = write_result {
            self.pool.lock().await.remove(&(host.clone(), port));
            return Err(ConvergeError::transport(format!(
                "write to {host}:{port}: {e}"
            )));
        }
        Ok(())
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
        next.ok_or_else(|| ConvergeError::transport("tcp inbox closed"))
    }
}
