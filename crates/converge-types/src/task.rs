//! Tasks and the task lifecycle state machine
//!
//! A task is a formally defined unit of work. The struct here is plain data;
//! every transition goes through a `TaskManager`, which owns claim atomicity
//! and persistence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::Topic;

/// Constraint key holding the claim lease in seconds
pub const CLAIM_TTL_KEY: &str = "claim_ttl_sec";
/// Constraint key for requested CPU tokens
pub const CPU_KEY: &str = "cpu";
/// Constraint key for requested memory in megabytes
pub const MEMORY_MB_KEY: &str = "memory_mb";

/// Lifecycle state of a task
///
/// PENDING is the only claimable state. COMPLETED, FAILED, and CANCELLED are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Whether the state admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A unit of work with objectives, inputs, and constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Structural description of the goal
    #[serde(default)]
    pub objective: BTreeMap<String, Value>,
    /// Data required to execute the task
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    /// Resulting data after execution
    #[serde(default)]
    pub outputs: Option<BTreeMap<String, Value>>,
    /// Limitations or requirements; recognized keys include `claim_ttl_sec`,
    /// `cpu`, and `memory_mb`
    #[serde(default)]
    pub constraints: BTreeMap<String, Value>,
    /// Identifier for the mechanism validating results
    #[serde(default = "default_evaluator")]
    pub evaluator: String,
    /// Current lifecycle state
    pub state: TaskState,
    /// Fingerprint of the agent holding the claim
    #[serde(default)]
    pub assigned_to: Option<String>,
    /// Monotonic seconds at claim time; drives `claim_ttl_sec` expiry
    #[serde(default)]
    pub claimed_at: Option<f64>,
    /// Final output or error descriptor
    #[serde(default)]
    pub result: Option<Value>,
    /// If set, only agents in this pool see the task
    #[serde(default)]
    pub pool_id: Option<String>,
    /// If set, used for routing
    #[serde(default)]
    pub topic: Option<Topic>,
    /// If non-empty, only agents with all of these capabilities see the task
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

fn default_evaluator() -> String {
    "default".to_string()
}

impl Task {
    /// Create a pending task with a fresh UUID
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            objective: BTreeMap::new(),
            inputs: BTreeMap::new(),
            outputs: None,
            constraints: BTreeMap::new(),
            evaluator: default_evaluator(),
            state: TaskState::Pending,
            assigned_to: None,
            claimed_at: None,
            result: None,
            pool_id: None,
            topic: None,
            required_capabilities: Vec::new(),
        }
    }

    /// Set the objective map, returning the updated task
    pub fn with_objective(mut self, objective: BTreeMap<String, Value>) -> Self {
        self.objective = objective;
        self
    }

    /// Restrict visibility to a pool, returning the updated task
    pub fn with_pool(mut self, pool_id: impl Into<String>) -> Self {
        self.pool_id = Some(pool_id.into());
        self
    }

    /// Add a constraint, returning the updated task
    pub fn with_constraint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    /// The claim lease in seconds, when present and numeric
    pub fn claim_ttl_sec(&self) -> Option<f64> {
        match self.constraints.get(CLAIM_TTL_KEY)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}
