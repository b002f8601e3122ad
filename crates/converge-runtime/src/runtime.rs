//! The agent runtime
//!
//! Owns an agent's lifecycle: start the transport, register with discovery,
//! run the listener and loop tasks, and unwind everything on stop. The
//! listener only enqueues and notifies; every call into agent code happens
//! on the loop task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use converge_coordination::{PoolManager, TaskManager};
use converge_core::{Agent, Store, ToolRegistry};
use converge_crypto::Identity;
use converge_network::{AgentDescriptor, DiscoveryService, IdentityRegistry, Transport};
use converge_observability::{MetricsCollector, ReplayLog, Tracer, MESSAGES_RECEIVED};
use converge_types::{Capability, Result};

use crate::{Executor, Inbox, Scheduler, StandardExecutor, DEFAULT_POLL_BATCH};

/// Store key prefix for runtime checkpoints
pub const CHECKPOINT_KEY_PREFIX: &str = "checkpoint:";

/// Loop tuning knobs
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on one scheduler wait
    pub wait_timeout: Duration,
    /// Messages drained per tick
    pub inbox_batch: usize,
    /// Minimum interval between checkpoint writes
    pub checkpoint_interval: Duration,
    /// Pause after a transport error in the listener
    pub error_backoff: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(1),
            inbox_batch: DEFAULT_POLL_BATCH,
            checkpoint_interval: Duration::from_secs(60),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Builder for [`AgentRuntime`]
pub struct AgentRuntimeBuilder {
    agent: Box<dyn Agent>,
    transport: Arc<dyn Transport>,
    task_manager: Option<Arc<TaskManager>>,
    pool_manager: Option<Arc<PoolManager>>,
    metrics: Option<Arc<MetricsCollector>>,
    discovery: Option<Arc<DiscoveryService>>,
    descriptor: Option<AgentDescriptor>,
    identity_registry: Option<Arc<IdentityRegistry>>,
    replay_log: Option<Arc<ReplayLog>>,
    tool_registry: Option<Arc<ToolRegistry>>,
    tool_timeout: Option<Duration>,
    checkpoint_store: Option<Arc<dyn Store>>,
    tracer: Tracer,
    executor: Option<Arc<dyn Executor>>,
    config: RuntimeConfig,
    inbox: Option<Inbox>,
}

impl AgentRuntimeBuilder {
    pub fn new(agent: Box<dyn Agent>, transport: Arc<dyn Transport>) -> Self {
        Self {
            agent,
            transport,
            task_manager: None,
            pool_manager: None,
            metrics: None,
            discovery: None,
            descriptor: None,
            identity_registry: None,
            replay_log: None,
            tool_registry: None,
            tool_timeout: None,
            checkpoint_store: None,
            tracer: Tracer::new(),
            executor: None,
            config: RuntimeConfig::default(),
            inbox: None,
        }
    }

    pub fn task_manager(mut self, tm: Arc<TaskManager>) -> Self {
        self.task_manager = Some(tm);
        self
    }

    pub fn pool_manager(mut self, pm: Arc<PoolManager>) -> Self {
        self.pool_manager = Some(pm);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register with discovery on start and unregister on stop
    pub fn discovery(mut self, discovery: Arc<DiscoveryService>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Explicit descriptor for discovery; built from the agent when absent
    pub fn descriptor(mut self, descriptor: AgentDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Verify inbound messages against this registry, dropping failures
    pub fn identity_registry(mut self, registry: Arc<IdentityRegistry>) -> Self {
        self.identity_registry = Some(registry);
        self
    }

    /// Record inbound and outbound messages
    pub fn replay_log(mut self, replay: Arc<ReplayLog>) -> Self {
        self.replay_log = Some(replay);
        self
    }

    pub fn tool_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tool_registry = Some(registry);
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// Write periodic `checkpoint:<agent_id>` records to this store
    pub fn checkpoint_store(mut self, store: Arc<dyn Store>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    pub fn tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Replace the standard executor
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom (e.g. bounded) inbox
    pub fn inbox(mut self, inbox: Inbox) -> Self {
        self.inbox = Some(inbox);
        self
    }

    pub fn build(self) -> AgentRuntime {
        let identity = self.agent.identity().clone();
        let agent_id = identity.fingerprint().to_string();

        let executor = match self.executor {
            Some(executor) => executor,
            None => {
                let mut standard = StandardExecutor::new(agent_id.clone(), identity.clone())
                    .with_transport(Arc::clone(&self.transport));
                if let Some(tm) = &self.task_manager {
                    standard = standard.with_task_manager(Arc::clone(tm));
                }
                if let Some(pm) = &self.pool_manager {
                    standard = standard.with_pool_manager(Arc::clone(pm));
                }
                if let Some(metrics) = &self.metrics {
                    standard = standard.with_metrics(Arc::clone(metrics));
                }
                if let Some(replay) = &self.replay_log {
                    standard = standard.with_replay_log(Arc::clone(replay));
                }
                if let Some(tools) = &self.tool_registry {
                    standard = standard.with_tool_registry(Arc::clone(tools));
                }
                if let Some(timeout) = self.tool_timeout {
                    standard = standard.with_tool_timeout(timeout);
                }
                Arc::new(standard)
            }
        };

        AgentRuntime {
            agent: Arc::new(tokio::sync::Mutex::new(self.agent)),
            agent_id,
            identity,
            transport: self.transport,
            task_manager: self.task_manager,
            pool_manager: self.pool_manager,
            metrics: self.metrics,
            discovery: self.discovery,
            descriptor: self.descriptor,
            identity_registry: self.identity_registry,
            replay_log: self.replay_log,
            checkpoint_store: self.checkpoint_store,
            tracer: self.tracer,
            executor,
            scheduler: Arc::new(Scheduler::new()),
            inbox: Arc::new(self.inbox.unwrap_or_default()),
            config: self.config,
            running: Arc::new(AtomicBool::new(false)),
            listen_task: tokio::sync::Mutex::new(None),
            loop_task: tokio::sync::Mutex::new(None),
        }
    }
}

/// Manages the execution loop of one agent
pub struct AgentRuntime {
    agent: Arc<tokio::sync::Mutex<Box<dyn Agent>>>,
    agent_id: String,
    identity: Identity,
    transport: Arc<dyn Transport>,
    task_manager: Option<Arc<TaskManager>>,
    pool_manager: Option<Arc<PoolManager>>,
    metrics: Option<Arc<MetricsCollector>>,
    discovery: Option<Arc<DiscoveryService>>,
    descriptor: Option<AgentDescriptor>,
    identity_registry: Option<Arc<IdentityRegistry>>,
    replay_log: Option<Arc<ReplayLog>>,
    checkpoint_store: Option<Arc<dyn Store>>,
    tracer: Tracer,
    executor: Arc<dyn Executor>,
    scheduler: Arc<Scheduler>,
    inbox: Arc<Inbox>,
    config: RuntimeConfig,
    running: Arc<AtomicBool>,
    listen_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    loop_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AgentRuntime {
    /// Builder entry point
    pub fn builder(agent: Box<dyn Agent>, transport: Arc<dyn Transport>) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new(agent, transport)
    }

    /// The agent's fingerprint
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The scheduler, for external wake-ups
    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Whether the loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the agent loop
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.agent.lock().await.on_start();
        self.transport.start().await?;

        if let Some(discovery) = &self.discovery {
            let descriptor = match &self.descriptor {
                Some(descriptor) => descriptor.clone(),
                None => {
                    let agent = self.agent.lock().await;
                    AgentDescriptor {
                        id: self.agent_id.clone(),
                        topics: agent.topics(),
                        capabilities: agent
                            .capabilities()
                            .into_iter()
                            .map(Capability::named)
                            .collect(),
                        public_key: Some(self.identity.public_key_bytes().to_vec()),
                    }
                }
            };
            discovery.register(descriptor)?;
        }

        *self.listen_task.lock().await = Some(self.spawn_listener());
        *self.loop_task.lock().await = Some(self.spawn_loop());
        debug!(agent_id = %self.agent_id, "agent runtime started");
        Ok(())
    }

    /// Stop the agent loop and release resources
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        // Unstick the loop's wait so it observes the running flag.
        self.scheduler.notify();

        if let Some(handle) = self.listen_task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(handle) = self.loop_task.lock().await.take() {
            let _ = handle.await;
        }

        self.transport.stop().await?;

        if let Some(discovery) = &self.discovery {
            if let Err(e) = discovery.unregister(&self.agent_id) {
                debug!(error = %e, "discovery unregister failed");
            }
        }

        self.agent.lock().await.on_stop();
        debug!(agent_id = %self.agent_id, "agent runtime stopped");
        Ok(())
    }

    fn spawn_listener(&self) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let transport = Arc::clone(&self.transport);
        let identity_registry = self.identity_registry.clone();
        let metrics = self.metrics.clone();
        let replay_log = self.replay_log.clone();
        let inbox = Arc::clone(&self.inbox);
        let scheduler = Arc::clone(&self.scheduler);
        let backoff = self.config.error_backoff;

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let received = match &identity_registry {
                    Some(registry) => transport.receive_verified(registry, None).await,
                    None => transport.receive(None).await.map(Some),
                };
                match received {
                    Ok(Some(message)) => {
                        if let Some(metrics) = &metrics {
                            metrics.inc(MESSAGES_RECEIVED);
                        }
                        if let Some(replay) = &replay_log {
                            replay.record_message(&message);
                        }
                        inbox.push(message).await;
                        scheduler.notify();
                    }
                    // Unverified message: already logged at debug, drop.
                    Ok(None) => continue,
                    Err(e) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        warn!(error = %e, "error receiving message");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        })
    }

    fn spawn_loop(&self) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let agent = Arc::clone(&self.agent);
        let agent_id = self.agent_id.clone();
        let task_manager = self.task_manager.clone();
        let pool_manager = self.pool_manager.clone();
        let checkpoint_store = self.checkpoint_store.clone();
        let tracer = self.tracer.clone();
        let executor = Arc::clone(&self.executor);
        let scheduler = Arc::clone(&self.scheduler);
        let inbox = Arc::clone(&self.inbox);
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut last_checkpoint: Option<Instant> = None;
            while running.load(Ordering::SeqCst) {
                scheduler.wait_for_work(config.wait_timeout).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let messages = inbox.poll(config.inbox_batch);

                let decisions = {
                    let mut agent = agent.lock().await;
                    let tasks = match (&task_manager, &pool_manager) {
                        (Some(tm), Some(pm)) => {
                            let pools = match pm.get_pools_for_agent(&agent_id) {
                                Ok(pools) => pools,
                                Err(e) => {
                                    warn!(error = %e, "pool lookup failed");
                                    Vec::new()
                                }
                            };
                            let capabilities = agent.capabilities();
                            tm.list_pending_tasks_for_agent(
                                &agent_id,
                                Some(&pools),
                                Some(&capabilities),
                            )
                        }
                        (Some(tm), None) => tm.list_pending_tasks(),
                        _ => Vec::new(),
                    };

                    if messages.is_empty() && tasks.is_empty() {
                        Vec::new()
                    } else {
                        agent.on_tick(&messages, &tasks);
                        let _span = tracer.span("agent.decide");
                        agent.decide(messages, tasks).await
                    }
                };

                if !decisions.is_empty() {
                    let span = tracer.span("executor.execute");
                    executor.execute(decisions).await;
                    span.end();
                }

                if let Some(store) = &checkpoint_store {
                    let due = last_checkpoint
                        .map(|at| at.elapsed() >= config.checkpoint_interval)
                        .unwrap_or(true);
                    if due {
                        let body = serde_json::json!({
                            "last_activity_ts": chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
                        });
                        let bytes = serde_json::to_vec(&body).unwrap_or_default();
                        if let Err(e) = store.put(&format!("{CHECKPOINT_KEY_PREFIX}{agent_id}"), bytes)
                        {
                            debug!(error = %e, "checkpoint write skipped");
                        }
                        last_checkpoint = Some(Instant::now());
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use converge_core::{Decision, MemoryStore, Message};
    use converge_network::{LocalTransport, LocalTransportRegistry};
    use converge_types::Task;

    struct Quiet {
        identity: Identity,
    }

    #[async_trait]
    impl Agent for Quiet {
        fn identity(&self) -> &Identity {
            &self.identity
        }

        async fn decide(&mut self, _messages: Vec<Message>, _tasks: Vec<Task>) -> Vec<Decision> {
            Vec::new()
        }
    }

    fn runtime_over(registry: Arc<LocalTransportRegistry>) -> AgentRuntime {
        let identity = Identity::generate();
        let transport = Arc::new(LocalTransport::with_registry(
            identity.fingerprint().to_string(),
            registry,
        ));
        AgentRuntime::builder(Box::new(Quiet { identity }), transport).build()
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let runtime = runtime_over(Arc::new(LocalTransportRegistry::new()));
        runtime.start().await.unwrap();
        assert!(runtime.is_running());
        runtime.start().await.unwrap();

        runtime.stop().await.unwrap();
        assert!(!runtime.is_running());
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_discovery_registration_lifecycle() {
        let registry = Arc::new(LocalTransportRegistry::new());
        let discovery = Arc::new(DiscoveryService::new());

        let identity = Identity::generate();
        let agent_id = identity.fingerprint().to_string();
        let transport = Arc::new(LocalTransport::with_registry(
            agent_id.clone(),
            registry,
        ));
        let runtime = AgentRuntime::builder(Box::new(Quiet { identity }), transport)
            .discovery(Arc::clone(&discovery))
            .build();

        runtime.start().await.unwrap();
        let descriptor = discovery.get(&agent_id).unwrap();
        assert!(descriptor.public_key.is_some());

        runtime.stop().await.unwrap();
        assert!(discovery.get(&agent_id).is_none());
    }

    #[tokio::test]
    async fn test_checkpoint_written() {
        let registry = Arc::new(LocalTransportRegistry::new());
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

        let identity = Identity::generate();
        let agent_id = identity.fingerprint().to_string();
        let transport = Arc::new(LocalTransport::with_registry(agent_id.clone(), registry));
        let runtime = AgentRuntime::builder(Box::new(Quiet { identity }), transport)
            .checkpoint_store(Arc::clone(&store))
            .config(RuntimeConfig {
                wait_timeout: Duration::from_millis(20),
                checkpoint_interval: Duration::from_millis(10),
                ..Default::default()
            })
            .build();

        runtime.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        runtime.stop().await.unwrap();

        let key = format!("{CHECKPOINT_KEY_PREFIX}{agent_id}");
        let bytes = store.get(&key).unwrap().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("last_activity_ts").is_some());
    }
}
