//! In-process transport
//!
//! A registry maps fingerprints to inbound queues and to subscribed topic
//! namespaces. Routing on send, evaluated in order:
//!
//! 1. A set `recipient` delivers to that queue only, including the sender's
//!    own (self-send is deliberate and tested)
//! 2. Otherwise, non-empty topics deliver to the union of namespace
//!    subscribers, broadcasting when no one subscribes
//! 3. Otherwise, broadcast
//!
//! Broadcast skips the sender's own queue. The process-global registry
//! exists for convenience; tests and embedders can inject their own and
//! `clear()` between runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use converge_core::Message;
use converge_types::{ConvergeError, Result};

use crate::Transport;

#[derive(Default)]
struct RegistryInner {
    queues: HashMap<String, mpsc::UnboundedSender<Message>>,
    subscriptions: HashMap<String, HashSet<String>>,
}

/// Shared registry local transports route through
#[derive(Default)]
pub struct LocalTransportRegistry {
    inner: Mutex<RegistryInner>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<LocalTransportRegistry>> = OnceLock::new();

impl LocalTransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-global registry
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(Self::new())))
    }

    fn register(&self, agent_id: &str, queue: mpsc::UnboundedSender<Message>) {
        self.inner.lock().queues.insert(agent_id.to_string(), queue);
    }

    fn unregister(&self, agent_id: &str) {
        let mut inner = self.inner.lock();
        inner.queues.remove(agent_id);
        inner.subscriptions.remove(agent_id);
    }

    /// Subscribe an agent to a topic namespace
    pub fn subscribe(&self, agent_id: &str, namespace: &str) {
        self.inner
            .lock()
            .subscriptions
            .entry(agent_id.to_string())
            .or_default()
            .insert(namespace.to_string());
    }

    /// Unsubscribe an agent from a namespace; a no-op when not subscribed
    pub fn unsubscribe(&self, agent_id: &str, namespace: &str) {
        if let Some(namespaces) = self.inner.lock().subscriptions.get_mut(agent_id) {
            namespaces.remove(namespace);
        }
    }

    /// Remove all queues and subscriptions (test isolation hook)
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.queues.clear();
        inner.subscriptions.clear();
    }

    fn route(&self, sender_id: &str, message: &Message) {
        let inner = self.inner.lock();

        if let Some(recipient) = &message.recipient {
            // Point-to-point delivers even to the sender itself.
            if let Some(queue) = inner.queues.get(recipient) {
                let _ = queue.send(message.clone());
            }
            return;
        }

        let mut targets: HashSet<&String> = HashSet::new();
        if !message.topics.is_empty() {
            let namespaces: HashSet<&str> =
                message.topics.iter().map(|t| t.namespace.as_str()).collect();
            for (agent_id, subscribed) in &inner.subscriptions {
                if subscribed.iter().any(|ns| namespaces.contains(ns.as_str())) {
                    targets.insert(agent_id);
                }
            }
        }
        if targets.is_empty() {
            targets = inner.queues.keys().collect();
        }

        for agent_id in targets {
            if agent_id == sender_id {
                continue;
            }
            if let Some(queue) = inner.queues.get(agent_id) {
                let _ = queue.send(message.clone());
            }
        }
    }
}

/// Transport for in-process communication
pub struct LocalTransport {
    agent_id: String,
    registry: Arc<LocalTransportRegistry>,
    queue_tx: mpsc::UnboundedSender<Message>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    started: AtomicBool,
}

impl LocalTransport {
    /// Transport routed through the process-global registry
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self::with_registry(agent_id, LocalTransportRegistry::global())
    }

    /// Transport routed through an injected registry
    pub fn with_registry(agent_id: impl Into<String>, registry: Arc<LocalTransportRegistry>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            agent_id: agent_id.into(),
            registry,
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            started: AtomicBool::new(false),
        }
    }

    /// Subscribe this agent to a topic namespace
    pub fn subscribe(&self, namespace: &str) {
        self.registry.subscribe(&self.agent_id, namespace);
    }

    /// Unsubscribe this agent from a topic namespace
    pub fn unsubscribe(&self, namespace: &str) {
        self.registry.unsubscribe(&self.agent_id, namespace);
    }

    fn ensure_started(&self) -> Result<()> {
        if !self.started.load(Ordering::Acquire) {
            return Err(ConvergeError::not_started("local transport"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn start(&self) -> Result<()> {
        self.registry.register(&self.agent_id, self.queue_tx.clone());
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.registry.unregister(&self.agent_id);
        self.started.store(false, Ordering::Release);
        Ok(())
    }

    async fn send(&self, message: &Message) -> Result<()> {
        self.ensure_started()?;
        self.registry.route(&self.agent_id, message);
        Ok(())
    }

    async fn receive(&self, timeout: Option<Duration>) -> Result<Message> {
        self.ensure_started()?;
        let mut queue = self.queue_rx.lock().await;
        let next = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, queue.recv())
                .await
                .map_err(|_| ConvergeError::timeout("transport receive"))?,
            None => queue.recv().await,
        };
        next.ok_or_else(|| ConvergeError::transport("local transport queue closed"))
    }
}
