//! Decision execution
//!
//! The executor dispatches a batch of decisions in order. A failure in one
//! decision is logged and never aborts the batch. Safety pre-checks run
//! before dispatch: an action allowlist on the decision kind, and resource
//! limits on submit/claim constraints; a rejection is a drop with a warning.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use converge_coordination::{
    BiddingProtocol, DelegationProtocol, NegotiationProtocol, PoolManager, TaskManager,
};
use converge_core::{Decision, Message, ToolRegistry};
use converge_crypto::Identity;
use converge_network::Transport;
use converge_observability::{
    MetricsCollector, ReplayLog, DECISIONS_EXECUTED, MESSAGES_SENT, TOOLS_INVOKED,
};
use converge_policy::{ActionPolicy, ResourceLimits};
use converge_types::{Result, Task, CPU_KEY, MEMORY_MB_KEY};

/// Action executors accept a decision batch
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a batch of decisions in order
    async fn execute(&self, decisions: Vec<Decision>);
}

/// Handler for `Decision::Custom` variants, keyed by kind
pub trait CustomHandler: Send + Sync {
    fn handle(&self, agent_id: &str, data: &Value) -> Result<()>;
}

/// Standard executor acting on the transport and managers directly
pub struct StandardExecutor {
    agent_id: String,
    identity: Identity,
    transport: Option<Arc<dyn Transport>>,
    task_manager: Option<Arc<TaskManager>>,
    pool_manager: Option<Arc<PoolManager>>,
    metrics: Option<Arc<MetricsCollector>>,
    replay_log: Option<Arc<ReplayLog>>,
    tool_registry: Option<Arc<ToolRegistry>>,
    tool_allowlist: Option<HashSet<String>>,
    tool_timeout: Option<Duration>,
    action_policy: Option<ActionPolicy>,
    resource_limits: Option<ResourceLimits>,
    bidding: HashMap<String, Arc<BiddingProtocol>>,
    negotiation: Option<Arc<NegotiationProtocol>>,
    delegation: Option<Arc<DelegationProtocol>>,
    custom_handlers: HashMap<String, Arc<dyn CustomHandler>>,
    votes: Mutex<HashMap<String, Vec<(String, Value)>>>,
}

impl StandardExecutor {
    pub fn new(agent_id: impl Into<String>, identity: Identity) -> Self {
        Self {
            agent_id: agent_id.into(),
            identity,
            transport: None,
            task_manager: None,
            pool_manager: None,
            metrics: None,
            replay_log: None,
            tool_registry: None,
            tool_allowlist: None,
            tool_timeout: None,
            action_policy: None,
            resource_limits: None,
            bidding: HashMap::new(),
            negotiation: None,
            delegation: None,
            custom_handlers: HashMap::new(),
            votes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_task_manager(mut self, task_manager: Arc<TaskManager>) -> Self {
        self.task_manager = Some(task_manager);
        self
    }

    pub fn with_pool_manager(mut self, pool_manager: Arc<PoolManager>) -> Self {
        self.pool_manager = Some(pool_manager);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_replay_log(mut self, replay_log: Arc<ReplayLog>) -> Self {
        self.replay_log = Some(replay_log);
        self
    }

    pub fn with_tool_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tool_registry = Some(registry);
        self
    }

    /// Restrict tool invocation to the named tools
    pub fn with_tool_allowlist(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tool_allowlist = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Bound each tool invocation; the outer wait is cancelled on expiry,
    /// though the tool itself may keep running on its worker thread
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn with_action_policy(mut self, policy: ActionPolicy) -> Self {
        self.action_policy = Some(policy);
        self
    }

    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = Some(limits);
        self
    }

    /// Register an auction for `SubmitBid` decisions
    pub fn with_auction(mut self, auction_id: impl Into<String>, protocol: Arc<BiddingProtocol>) -> Self {
        self.bidding.insert(auction_id.into(), protocol);
        self
    }

    pub fn with_negotiation(mut self, protocol: Arc<NegotiationProtocol>) -> Self {
        self.negotiation = Some(protocol);
        self
    }

    pub fn with_delegation(mut self, protocol: Arc<DelegationProtocol>) -> Self {
        self.delegation = Some(protocol);
        self
    }

    /// Register a handler for a `Custom` decision kind
    pub fn with_custom_handler(
        mut self,
        kind: impl Into<String>,
        handler: Arc<dyn CustomHandler>,
    ) -> Self {
        self.custom_handlers.insert(kind.into(), handler);
        self
    }

    /// Votes recorded so far for a vote id
    pub fn votes(&self, vote_id: &str) -> Vec<(String, Value)> {
        self.votes.lock().get(vote_id).cloned().unwrap_or_default()
    }

    fn inc(&self, metric: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc(metric);
        }
    }

    fn task_within_limits(&self, task: &Task) -> bool {
        let Some(limits) = &self.resource_limits else {
            return true;
        };
        let cpu = task
            .constraints
            .get(CPU_KEY)
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let memory_mb = task
            .constraints
            .get(MEMORY_MB_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        limits.allows(cpu, memory_mb)
    }

    /// Safety pre-check; false drops the decision with a warning
    fn precheck(&self, decision: &Decision) -> bool {
        if let Some(policy) = &self.action_policy {
            if !policy.is_allowed(decision.kind()) {
                warn!(kind = decision.kind(), "action policy rejected decision");
                return false;
            }
        }
        match decision {
            Decision::SubmitTask { task } => {
                if !self.task_within_limits(task) {
                    warn!(task_id = %task.id, "task constraints exceed resource limits");
                    return false;
                }
            }
            Decision::ClaimTask { task_id } => {
                if let Some(tm) = &self.task_manager {
                    if let Ok(Some(task)) = tm.get_task(task_id) {
                        if !self.task_within_limits(&task) {
                            warn!(%task_id, "claim rejected: constraints exceed resource limits");
                            return false;
                        }
                    }
                }
            }
            _ => {}
        }
        true
    }

    async fn send_message(&self, message: Message) -> Result<()> {
        let Some(transport) = &self.transport else {
            debug!("no transport configured; dropping SendMessage");
            return Ok(());
        };
        let message = if message.signature.is_empty() {
            message.sign(&self.identity)?
        } else {
            message
        };
        transport.send(&message).await?;
        if let Some(replay) = &self.replay_log {
            replay.record_message(&message);
        }
        self.inc(MESSAGES_SENT);
        Ok(())
    }

    async fn invoke_tool(
        &self,
        tool_name: &str,
        params: serde_json::Map<String, Value>,
    ) -> Result<()> {
        let Some(registry) = &self.tool_registry else {
            warn!(tool_name, "no tool registry configured");
            return Ok(());
        };
        if let Some(allowlist) = &self.tool_allowlist {
            if !allowlist.contains(tool_name) {
                warn!(tool_name, "tool not in allowlist");
                return Ok(());
            }
        }
        let Some(tool) = registry.get(tool_name) else {
            warn!(tool_name, "unknown tool");
            return Ok(());
        };

        self.inc(TOOLS_INVOKED);
        let handle = tokio::task::spawn_blocking(move || tool.run(params));
        let joined = match self.tool_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The worker thread may still be running; only the wait
                    // is cancelled.
                    warn!(tool_name, "tool timed out");
                    return Ok(());
                }
            },
            None => handle.await,
        };
        match joined {
            Ok(Ok(value)) => debug!(tool_name, result = %value, "tool completed"),
            Ok(Err(e)) => warn!(tool_name, error = %e, "tool failed"),
            Err(e) => warn!(tool_name, error = %e, "tool task panicked"),
        }
        Ok(())
    }

    async fn dispatch(&self, decision: Decision) -> Result<()> {
        match decision {
            Decision::SendMessage { message } => {
                debug!(id = %message.id, "executing SendMessage");
                self.send_message(message).await?;
            }
            Decision::SubmitTask { task } => {
                debug!(task_id = %task.id, "executing SubmitTask");
                if let Some(tm) = &self.task_manager {
                    tm.submit(task)?;
                }
            }
            Decision::ClaimTask { task_id } => {
                debug!(%task_id, "executing ClaimTask");
                if let Some(tm) = &self.task_manager {
                    if !tm.claim(&self.agent_id, &task_id)? {
                        warn!(%task_id, "failed to claim task");
                    }
                }
            }
            Decision::ReportTask { task_id, result } => {
                debug!(%task_id, "executing ReportTask");
                if let Some(tm) = &self.task_manager {
                    tm.report(&self.agent_id, &task_id, result)?;
                }
            }
            Decision::JoinPool { pool_id } => {
                debug!(%pool_id, "executing JoinPool");
                if let Some(pm) = &self.pool_manager {
                    pm.join_pool(&self.agent_id, &pool_id)?;
                }
            }
            Decision::LeavePool { pool_id } => {
                debug!(%pool_id, "executing LeavePool");
                if let Some(pm) = &self.pool_manager {
                    pm.leave_pool(&self.agent_id, &pool_id)?;
                }
            }
            Decision::CreatePool { spec } => {
                debug!(?spec, "executing CreatePool");
                if let Some(pm) = &self.pool_manager {
                    pm.create_pool(spec)?;
                }
            }
            Decision::SubmitBid {
                auction_id,
                amount,
                content,
            } => {
                debug!(%auction_id, amount, "executing SubmitBid");
                match self.bidding.get(&auction_id) {
                    Some(protocol) => {
                        if !protocol.submit_bid(&self.agent_id, amount, content) {
                            warn!(%auction_id, "bid rejected: auction closed");
                        }
                    }
                    None => warn!(%auction_id, "unknown auction"),
                }
            }
            Decision::Vote { vote_id, option } => {
                debug!(%vote_id, "executing Vote");
                self.votes
                    .lock()
                    .entry(vote_id)
                    .or_default()
                    .push((self.agent_id.clone(), option));
            }
            Decision::Propose { session_id, content } => {
                debug!(%session_id, "executing Propose");
                match &self.negotiation {
                    Some(protocol) => {
                        if !protocol.propose(&session_id, &self.agent_id, content) {
                            warn!(%session_id, "proposal rejected");
                        }
                    }
                    None => warn!("no negotiation protocol configured"),
                }
            }
            Decision::AcceptProposal { session_id } => {
                debug!(%session_id, "executing AcceptProposal");
                match &self.negotiation {
                    Some(protocol) => {
                        if !protocol.accept(&session_id, &self.agent_id) {
                            warn!(%session_id, "accept rejected");
                        }
                    }
                    None => warn!("no negotiation protocol configured"),
                }
            }
            Decision::RejectProposal { session_id } => {
                debug!(%session_id, "executing RejectProposal");
                match &self.negotiation {
                    Some(protocol) => {
                        if !protocol.reject(&session_id, &self.agent_id) {
                            warn!(%session_id, "reject failed");
                        }
                    }
                    None => warn!("no negotiation protocol configured"),
                }
            }
            Decision::Delegate {
                delegatee_id,
                scope,
            } => {
                debug!(%delegatee_id, "executing Delegate");
                match &self.delegation {
                    Some(protocol) => {
                        protocol.delegate(&self.agent_id, &delegatee_id, scope);
                    }
                    None => warn!("no delegation protocol configured"),
                }
            }
            Decision::RevokeDelegation { delegation_id } => {
                debug!(%delegation_id, "executing RevokeDelegation");
                match &self.delegation {
                    Some(protocol) => {
                        if !protocol.revoke(&delegation_id) {
                            warn!(%delegation_id, "unknown delegation");
                        }
                    }
                    None => warn!("no delegation protocol configured"),
                }
            }
            Decision::InvokeTool { tool_name, params } => {
                debug!(%tool_name, "executing InvokeTool");
                self.invoke_tool(&tool_name, params).await?;
            }
            Decision::Custom { kind, data } => match self.custom_handlers.get(&kind) {
                Some(handler) => {
                    debug!(%kind, "executing custom decision");
                    handler.handle(&self.agent_id, &data)?;
                }
                None => warn!(%kind, "unknown decision type"),
            },
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for StandardExecutor {
    async fn execute(&self, decisions: Vec<Decision>) {
        for decision in decisions {
            self.inc(DECISIONS_EXECUTED);
            if !self.precheck(&decision) {
                continue;
            }
            let kind = decision.kind().to_string();
            if let Err(e) = self.dispatch(decision).await {
                warn!(kind, error = %e, "error executing decision");
            }
        }
    }
}
