//! Agent discovery
//!
//! The discovery service holds exported agent descriptors and answers
//! queries by topic intersection and capability subset. With a store
//! attached, descriptors persist under `discovery:agent:<id>` and load
//! eagerly at construction; malformed entries are skipped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use converge_core::Store;
use converge_types::{Capability, ConvergeError, Result, Topic};

/// Store key prefix for persisted descriptors
pub const DISCOVERY_KEY_PREFIX: &str = "discovery:agent:";
/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

/// An exported record describing an agent to its peers
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDescriptor {
    /// Agent fingerprint
    pub id: String,
    /// Topics the agent is interested in
    pub topics: Vec<Topic>,
    /// Capabilities the agent possesses
    pub capabilities: Vec<Capability>,
    /// Ed25519 public key, when the agent exports one
    pub public_key: Option<Vec<u8>>,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topics: Vec::new(),
            capabilities: Vec::new(),
            public_key: None,
        }
    }

    /// Names of this descriptor's capabilities
    pub fn capability_names(&self) -> HashSet<&str> {
        self.capabilities.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Criteria for discovering agents
#[derive(Debug, Clone, Default)]
pub struct DiscoveryQuery {
    /// Require a non-empty intersection with the candidate's topics
    pub topics: Vec<Topic>,
    /// Require the candidate to hold all of these capabilities
    pub capabilities: Vec<String>,
    /// Reserved for trust-aware discovery
    pub trust_threshold: f64,
}

/// Persisted capability entries tolerate the legacy plain-string form
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CapabilityEntry {
    Full(Capability),
    Named(String),
}

impl From<CapabilityEntry> for Capability {
    fn from(entry: CapabilityEntry) -> Self {
        match entry {
            CapabilityEntry::Full(capability) => capability,
            CapabilityEntry::Named(name) => Capability::named(name),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DescriptorSnapshot {
    v: u32,
    id: String,
    topics: Vec<Topic>,
    capabilities: Vec<CapabilityEntry>,
    /// Base64-encoded public key
    public_key: Option<String>,
}

fn encode_descriptor(descriptor: &AgentDescriptor) -> Result<Vec<u8>> {
    serde_json::to_vec(&DescriptorSnapshot {
        v: SNAPSHOT_VERSION,
        id: descriptor.id.clone(),
        topics: descriptor.topics.clone(),
        capabilities: descriptor
            .capabilities
            .iter()
            .cloned()
            .map(CapabilityEntry::Full)
            .collect(),
        public_key: descriptor.public_key.as_ref().map(|k| BASE64.encode(k)),
    })
    .map_err(|e| ConvergeError::serialization(e.to_string()))
}

fn decode_descriptor(bytes: &[u8]) -> Result<AgentDescriptor> {
    let snapshot: DescriptorSnapshot =
        serde_json::from_slice(bytes).map_err(|e| ConvergeError::serialization(e.to_string()))?;
    if snapshot.v != SNAPSHOT_VERSION {
        return Err(ConvergeError::serialization(format!(
            "unsupported descriptor snapshot version {}",
            snapshot.v
        )));
    }
    let public_key = match snapshot.public_key {
        Some(encoded) => Some(
            BASE64
                .decode(encoded)
                .map_err(|e| ConvergeError::serialization(format!("bad public key: {e}")))?,
        ),
        None => None,
    };
    Ok(AgentDescriptor {
        id: snapshot.id,
        topics: snapshot.topics,
        capabilities: snapshot.capabilities.into_iter().map(Into::into).collect(),
        public_key,
    })
}

/// Registry of agent descriptors with query support
pub struct DiscoveryService {
    descriptors: RwLock<HashMap<String, AgentDescriptor>>,
    store: Option<Arc<dyn Store>>,
}

impl DiscoveryService {
    /// Service without persistence
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Service persisting to a store, eagerly loading existing descriptors
    pub fn with_store(store: Arc<dyn Store>) -> Self {
        let mut descriptors = HashMap::new();
        match store.list(DISCOVERY_KEY_PREFIX) {
            Ok(keys) => {
                for key in keys {
                    let Ok(Some(bytes)) = store.get(&key) else {
                        continue;
                    };
                    match decode_descriptor(&bytes) {
                        Ok(descriptor) => {
                            descriptors.insert(descriptor.id.clone(), descriptor);
                        }
                        Err(e) => debug!(key, error = %e, "skipping malformed descriptor"),
                    }
                }
            }
            Err(e) => debug!(error = %e, "descriptor preload failed"),
        }
        Self {
            descriptors: RwLock::new(descriptors),
            store: Some(store),
        }
    }

    /// Register (or replace) a descriptor
    pub fn register(&self, descriptor: AgentDescriptor) -> Result<()> {
        if let Some(store) = &self.store {
            store.put(
                &format!("{DISCOVERY_KEY_PREFIX}{}", descriptor.id),
                encode_descriptor(&descriptor)?,
            )?;
        }
        self.descriptors
            .write()
            .insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    /// Remove a descriptor
    pub fn unregister(&self, agent_id: &str) -> Result<()> {
        self.descriptors.write().remove(agent_id);
        if let Some(store) = &self.store {
            store.delete(&format!("{DISCOVERY_KEY_PREFIX}{agent_id}"))?;
        }
        Ok(())
    }

    /// All currently known descriptors
    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.descriptors.read().values().cloned().collect()
    }

    /// Look up one descriptor by agent id
    pub fn get(&self, agent_id: &str) -> Option<AgentDescriptor> {
        self.descriptors.read().get(agent_id).cloned()
    }

    /// Filter candidates by the query
    ///
    /// A non-empty topic filter requires a non-empty intersection of
    /// canonical topic strings; a non-empty capability filter requires the
    /// query's capabilities to be a subset of the candidate's.
    pub fn query(
        &self,
        query: &DiscoveryQuery,
        candidates: &[AgentDescriptor],
    ) -> Vec<AgentDescriptor> {
        let query_topics: HashSet<String> = query.topics.iter().map(Topic::canonical).collect();

        candidates
            .iter()
            .filter(|candidate| {
                if !query_topics.is_empty() {
                    let candidate_topics: HashSet<String> =
                        candidate.topics.iter().map(Topic::canonical).collect();
                    if candidate_topics.intersection(&query_topics).next().is_none() {
                        return false;
                    }
                }
                if !query.capabilities.is_empty() {
                    let names = candidate.capability_names();
                    if !query.capabilities.iter().all(|c| names.contains(c.as_str())) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect()
    }

    /// Query against the registered descriptors
    pub fn query_registered(&self, query: &DiscoveryQuery) -> Vec<AgentDescriptor> {
        self.query(query, &self.descriptors())
    }
}

impl Default for DiscoveryService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::MemoryStore;

    fn descriptor(id: &str, topics: &[&str], caps: &[&str]) -> AgentDescriptor {
        AgentDescriptor {
            id: id.to_string(),
            topics: topics.iter().map(|t| Topic::new(*t)).collect(),
            capabilities: caps.iter().map(|c| Capability::named(*c)).collect(),
            public_key: None,
        }
    }

    #[test]
    fn test_query_topic_intersection() {
        let service = DiscoveryService::new();
        let candidates = vec![
            descriptor("a", &["news", "tasks"], &[]),
            descriptor("b", &["metrics"], &[]),
        ];
        let query = DiscoveryQuery {
            topics: vec![Topic::new("news")],
            ..Default::default()
        };
        let matched = service.query(&query, &candidates);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a");
    }

    #[test]
    fn test_query_capability_subset() {
        let service = DiscoveryService::new();
        let candidates = vec![
            descriptor("a", &[], &["summarize", "translate"]),
            descriptor("b", &[], &["summarize"]),
        ];
        let query = DiscoveryQuery {
            capabilities: vec!["summarize".to_string(), "translate".to_string()],
            ..Default::default()
        };
        let matched = service.query(&query, &candidates);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a");
    }

    #[test]
    fn test_empty_query_matches_all() {
        let service = DiscoveryService::new();
        let candidates = vec![descriptor("a", &[], &[]), descriptor("b", &[], &[])];
        assert_eq!(
            service.query(&DiscoveryQuery::default(), &candidates).len(),
            2
        );
    }

    #[test]
    fn test_persistence_roundtrip() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        {
            let service = DiscoveryService::with_store(Arc::clone(&store));
            let mut desc = descriptor("agent1", &["news"], &["summarize"]);
            desc.public_key = Some(vec![9u8; 32]);
            service.register(desc).unwrap();
        }

        let service = DiscoveryService::with_store(Arc::clone(&store));
        let loaded = service.get("agent1").unwrap();
        assert_eq!(loaded.public_key, Some(vec![9u8; 32]));
        assert!(loaded.capability_names().contains("summarize"));

        service.unregister("agent1").unwrap();
        assert!(service.get("agent1").is_none());
        assert!(store.list(DISCOVERY_KEY_PREFIX).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_persisted_entry_is_skipped() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store
            .put("discovery:agent:bad", b"not json".to_vec())
            .unwrap();
        let service = DiscoveryService::with_store(store);
        assert!(service.descriptors().is_empty());
    }

    #[test]
    fn test_legacy_string_capabilities_tolerated() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let legacy = serde_json::json!({
            "v": 1,
            "id": "old-agent",
            "topics": [],
            "capabilities": ["summarize", {"name": "translate", "version": "1.0"}],
            "public_key": null,
        });
        store
            .put(
                "discovery:agent:old-agent",
                serde_json::to_vec(&legacy).unwrap(),
            )
            .unwrap();

        let service = DiscoveryService::with_store(store);
        let descriptor = service.get("old-agent").unwrap();
        let names = descriptor.capability_names();
        assert!(names.contains("summarize"));
        assert!(names.contains("translate"));
    }
}
