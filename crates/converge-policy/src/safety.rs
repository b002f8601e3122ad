//! Executor safety bounds

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Upper bounds for resource consumption by a task or agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum virtual CPU units
    pub max_cpu_tokens: f64,
    /// Maximum memory in megabytes
    pub max_memory_mb: u64,
    /// Maximum network calls per time window
    pub max_network_requests: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_cpu_tokens: 1.0,
            max_memory_mb: 512,
            max_network_requests: 100,
        }
    }
}

impl ResourceLimits {
    /// Check a resource request against these limits
    pub fn allows(&self, requested_cpu: f64, requested_memory_mb: u64) -> bool {
        requested_cpu <= self.max_cpu_tokens && requested_memory_mb <= self.max_memory_mb
    }
}

/// Allowlist controlling which decision kinds an agent may execute
///
/// With no allowlist configured, every action is permitted.
#[derive(Debug, Clone, Default)]
pub struct ActionPolicy {
    allowed_actions: Option<HashSet<String>>,
}

impl ActionPolicy {
    /// Permissive policy allowing all actions
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Policy allowing only the named actions
    pub fn allowlist(actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_actions: Some(actions.into_iter().map(Into::into).collect()),
        }
    }

    /// Check if an action is authorized
    pub fn is_allowed(&self, action_name: &str) -> bool {
        match &self.allowed_actions {
            None => true,
            Some(allowed) => allowed.contains(action_name),
        }
    }
}
