//! Fingerprint → public key lookup for verified receive

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::AgentDescriptor;

/// Maps agent fingerprints to Ed25519 public keys
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    keys: RwLock<HashMap<String, Vec<u8>>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent's public key
    pub fn register(&self, agent_id: impl Into<String>, public_key: Vec<u8>) {
        self.keys.write().insert(agent_id.into(), public_key);
    }

    /// Register from a discovery descriptor carrying a public key
    pub fn register_descriptor(&self, descriptor: &AgentDescriptor) {
        if let Some(key) = &descriptor.public_key {
            self.register(descriptor.id.clone(), key.clone());
        }
    }

    /// Remove an agent from the registry
    pub fn unregister(&self, agent_id: &str) {
        self.keys.write().remove(agent_id);
    }

    /// Public key for an agent, or `None` if unknown
    pub fn get(&self, agent_id: &str) -> Option<Vec<u8>> {
        self.keys.read().get(agent_id).cloned()
    }

    /// Whether the agent is known
    pub fn contains(&self, agent_id: &str) -> bool {
        self.keys.read().contains_key(agent_id)
    }
}
