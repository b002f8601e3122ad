//! Pool admission policies

use std::collections::HashSet;

/// What a policy gets to see when an agent asks to join a pool
#[derive(Debug, Clone, Default)]
pub struct PoolContext {
    /// The pool being joined
    pub pool_id: String,
    /// Fingerprints of current members
    pub existing_agents: Vec<String>,
    /// Canonical strings of the pool's topics
    pub topics: Vec<String>,
    /// Secret presented by the join request, if any
    pub token: Option<String>,
}

/// Rule deciding whether an agent may join a pool
pub trait AdmissionPolicy: Send + Sync {
    /// Determine if the agent is authorized to join
    fn can_admit(&self, agent_id: &str, context: &PoolContext) -> bool;
}

/// Permissive policy that admits any agent
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAdmission;

impl AdmissionPolicy for OpenAdmission {
    fn can_admit(&self, _agent_id: &str, _context: &PoolContext) -> bool {
        true
    }
}

/// Restrictive policy admitting only a predefined set of agents
#[derive(Debug, Clone)]
pub struct WhitelistAdmission {
    whitelist: HashSet<String>,
}

impl WhitelistAdmission {
    pub fn new(whitelist: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            whitelist: whitelist.into_iter().map(Into::into).collect(),
        }
    }
}

impl AdmissionPolicy for WhitelistAdmission {
    fn can_admit(&self, agent_id: &str, _context: &PoolContext) -> bool {
        self.whitelist.contains(agent_id)
    }
}

/// Policy requiring a shared secret in the join request
#[derive(Debug, Clone)]
pub struct TokenAdmission {
    required_token: String,
}

impl TokenAdmission {
    pub fn new(required_token: impl Into<String>) -> Self {
        Self {
            required_token: required_token.into(),
        }
    }
}

impl AdmissionPolicy for TokenAdmission {
    fn can_admit(&self, _agent_id: &str, context: &PoolContext) -> bool {
        context.token.as_deref() == Some(self.required_token.as_str())
    }
}
