//! The `run` subcommand
//!
//! Spawns the configured number of agent runtimes in-process, wires the
//! shared managers and discovery, and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use converge_coordination::{PoolManager, TaskManager};
use converge_core::{Agent, Decision, FileStore, MemoryStore, Message, PoolSpec, Store};
use converge_crypto::Identity;
use converge_network::{DiscoveryService, LocalTransport, TcpTransport, Transport};
use converge_observability::MetricsCollector;
use converge_runtime::AgentRuntime;
use converge_types::Task;

use crate::config::{Config, TransportKind};

/// Placeholder agent that listens without acting; embedders supply their own
struct IdleAgent {
    identity: Identity,
}

#[async_trait]
impl Agent for IdleAgent {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn decide(&mut self, _messages: Vec<Message>, _tasks: Vec<Task>) -> Vec<Decision> {
        Vec::new()
    }
}

fn discovery_for(config: &Config) -> Result<Option<Arc<DiscoveryService>>> {
    match config.discovery_store.as_deref() {
        None => Ok(None),
        Some("memory") => {
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            Ok(Some(Arc::new(DiscoveryService::with_store(store))))
        }
        Some(path) => {
            let store: Arc<dyn Store> = Arc::new(
                FileStore::new(path).with_context(|| format!("opening discovery store {path}"))?,
            );
            Ok(Some(Arc::new(DiscoveryService::with_store(store))))
        }
    }
}

pub async fn run(config: Config) -> Result<()> {
    let task_manager = Arc::new(TaskManager::in_memory());
    let pool_manager = Arc::new(PoolManager::in_memory());
    let metrics = Arc::new(MetricsCollector::new());
    let discovery = discovery_for(&config)?;

    if let Some(pool_id) = &config.pool_id {
        pool_manager
            .create_pool(PoolSpec::with_id(pool_id.clone()))
            .context("creating configured pool")?;
        info!(pool_id, "created pool");
    }

    let mut runtimes = Vec::new();
    for index in 0..config.agents {
        let identity = Identity::generate();
        let agent_id = identity.fingerprint().to_string();

        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Local => Arc::new(LocalTransport::new(agent_id.clone())),
            TransportKind::Tcp => {
                // Ports increment per agent so every runtime gets a listener.
                let port = config.port + index as u16;
                Arc::new(TcpTransport::new(config.host.clone(), port, agent_id.clone()))
            }
        };

        if let Some(pool_id) = &config.pool_id {
            pool_manager
                .join_pool(&agent_id, pool_id)
                .context("joining configured pool")?;
        }

        let mut builder = AgentRuntime::builder(Box::new(IdleAgent { identity }), transport)
            .task_manager(Arc::clone(&task_manager))
            .pool_manager(Arc::clone(&pool_manager))
            .metrics(Arc::clone(&metrics));
        if let Some(discovery) = &discovery {
            builder = builder.discovery(Arc::clone(discovery));
        }
        let runtime = builder.build();
        runtime.start().await?;
        info!(agent_id = %runtime.agent_id(), index, "agent runtime started");
        runtimes.push(runtime);
    }

    info!(agents = runtimes.len(), "running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutting down");

    for runtime in &runtimes {
        runtime.stop().await?;
    }
    info!(metrics = %metrics.format_prometheus(), "final counters");
    Ok(())
}
