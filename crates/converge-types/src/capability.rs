//! Agent capabilities

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A specific ability or tool an agent possesses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Unique capability name
    pub name: String,
    /// Semantic version string
    #[serde(default = "default_capability_version")]
    pub version: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Usage limitations
    #[serde(default)]
    pub constraints: BTreeMap<String, Value>,
    /// Resource costs associated with usage
    #[serde(default)]
    pub costs: BTreeMap<String, f64>,
    /// Expected execution latency
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_capability_version() -> String {
    "1.0".to_string()
}

impl Capability {
    /// Create a capability with just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_capability_version(),
            description: String::new(),
            constraints: BTreeMap::new(),
            costs: BTreeMap::new(),
            latency_ms: 0,
        }
    }
}

/// A collection of capabilities possessed by an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub capabilities: Vec<Capability>,
}

impl CapabilitySet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability to the set
    pub fn add(&mut self, capability: Capability) {
        self.capabilities.push(capability);
    }

    /// Check if a capability exists by name
    pub fn has(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }

    /// All capability names in the set
    pub fn names(&self) -> Vec<String> {
        self.capabilities.iter().map(|c| c.name.clone()).collect()
    }
}
