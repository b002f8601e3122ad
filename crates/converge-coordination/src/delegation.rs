//! Delegation of authority between agents

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scoped mandate granted by one agent to another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator_id: String,
    pub delegatee_id: String,
    pub scope: Vec<String>,
    pub active: bool,
}

/// Manages delegation mandates
#[derive(Default)]
pub struct DelegationProtocol {
    delegations: Mutex<HashMap<String, Delegation>>,
}

impl DelegationProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new delegation, returning its id
    pub fn delegate(&self, delegator_id: &str, delegatee_id: &str, scope: Vec<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.delegations.lock().insert(
            id.clone(),
            Delegation {
                delegator_id: delegator_id.to_string(),
                delegatee_id: delegatee_id.to_string(),
                scope,
                active: true,
            },
        );
        id
    }

    /// Revoke an active delegation; false when unknown
    pub fn revoke(&self, delegation_id: &str) -> bool {
        match self.delegations.lock().get_mut(delegation_id) {
            Some(delegation) => {
                delegation.active = false;
                true
            }
            None => false,
        }
    }

    /// Retrieve a delegation snapshot by id
    pub fn get(&self, delegation_id: &str) -> Option<Delegation> {
        self.delegations.lock().get(delegation_id).cloned()
    }
}
