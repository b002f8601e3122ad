//! Pool membership management
//!
//! Pools are cached in memory and mirrored to the store under `pool:<id>` at
//! every mutation. Admission gates run in a fixed order on join: resolve,
//! admission policy, trust threshold, then add-and-persist.
//!
//! Policy and trust instances are process-local and are not part of the
//! persisted snapshot; a pool materialized from the store carries only its
//! data fields.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use converge_core::{MemoryStore, PoolSpec, Store};
use converge_policy::{AdmissionPolicy, PoolContext, TrustModel};
use converge_types::{ConvergeError, Result, Topic};

/// Store key prefix for pool snapshots
pub const POOL_KEY_PREFIX: &str = "pool:";
/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

/// A scoped sub-network of agents organized around shared topics
#[derive(Clone, Default)]
pub struct Pool {
    /// Unique pool identifier
    pub id: String,
    /// Topics associated with this pool
    pub topics: Vec<Topic>,
    /// Governance rules, opaque to the manager
    pub governance: Map<String, Value>,
    /// Fingerprints of current members
    pub agents: HashSet<String>,
    /// Admission policy evaluated on join
    pub admission: Option<Arc<dyn AdmissionPolicy>>,
    /// Trust source consulted against `trust_threshold`
    pub trust: Option<Arc<dyn TrustModel>>,
    /// Minimum trust score required to join
    pub trust_threshold: f64,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("topics", &self.topics)
            .field("agents", &self.agents)
            .field("has_admission", &self.admission.is_some())
            .field("has_trust", &self.trust.is_some())
            .field("trust_threshold", &self.trust_threshold)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct PoolSnapshot {
    v: u32,
    id: String,
    topics: Vec<Topic>,
    governance: Map<String, Value>,
    agents: Vec<String>,
    trust_threshold: f64,
}

fn encode_pool(pool: &Pool) -> Result<Vec<u8>> {
    let mut agents: Vec<String> = pool.agents.iter().cloned().collect();
    agents.sort();
    serde_json::to_vec(&PoolSnapshot {
        v: SNAPSHOT_VERSION,
        id: pool.id.clone(),
        topics: pool.topics.clone(),
        governance: pool.governance.clone(),
        agents,
        trust_threshold: pool.trust_threshold,
    })
    .map_err(|e| ConvergeError::serialization(e.to_string()))
}

fn decode_pool(bytes: &[u8]) -> Result<Pool> {
    let snapshot: PoolSnapshot =
        serde_json::from_slice(bytes).map_err(|e| ConvergeError::serialization(e.to_string()))?;
    if snapshot.v != SNAPSHOT_VERSION {
        return Err(ConvergeError::serialization(format!(
            "unsupported pool snapshot version {}",
            snapshot.v
        )));
    }
    Ok(Pool {
        id: snapshot.id,
        topics: snapshot.topics,
        governance: snapshot.governance,
        agents: snapshot.agents.into_iter().collect(),
        admission: None,
        trust: None,
        trust_threshold: snapshot.trust_threshold,
    })
}

/// Manages the lifecycle of agent pools and membership
pub struct PoolManager {
    store: Arc<dyn Store>,
    pools: Mutex<HashMap<String, Pool>>,
}

impl PoolManager {
    /// Create a manager over the given store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Create a manager over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn persist(&self, pool: &Pool) -> Result<()> {
        self.store
            .put(&format!("{POOL_KEY_PREFIX}{}", pool.id), encode_pool(pool)?)
    }

    fn resolve<'a>(
        &self,
        pools: &'a mut HashMap<String, Pool>,
        pool_id: &str,
    ) -> Result<Option<&'a mut Pool>> {
        if pools.contains_key(pool_id) {
            return Ok(pools.get_mut(pool_id));
        }
        let Some(bytes) = self.store.get(&format!("{POOL_KEY_PREFIX}{pool_id}"))? else {
            return Ok(None);
        };
        let pool = decode_pool(&bytes)?;
        Ok(Some(pools.entry(pool_id.to_string()).or_insert(pool)))
    }

    /// Create a new pool from a specification
    pub fn create_pool(&self, spec: PoolSpec) -> Result<Pool> {
        let pool = Pool {
            id: spec.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            topics: spec.topics,
            governance: spec.governance,
            agents: HashSet::new(),
            admission: spec.admission,
            trust: spec.trust,
            trust_threshold: spec.trust_threshold,
        };
        self.persist(&pool)?;
        self.pools.lock().insert(pool.id.clone(), pool.clone());
        Ok(pool)
    }

    /// Add an agent to a pool, evaluating admission gates in order
    ///
    /// Returns false when the pool is unknown, the admission policy rejects,
    /// or the agent's trust score is below the pool threshold.
    pub fn join_pool(&self, agent_id: &str, pool_id: &str) -> Result<bool> {
        self.join_pool_with_token(agent_id, pool_id, None)
    }

    /// `join_pool` with a secret presented to token-gated admission policies
    pub fn join_pool_with_token(
        &self,
        agent_id: &str,
        pool_id: &str,
        token: Option<&str>,
    ) -> Result<bool> {
        let mut pools = self.pools.lock();
        let Some(pool) = self.resolve(&mut pools, pool_id)? else {
            return Ok(false);
        };

        if let Some(policy) = &pool.admission {
            let context = PoolContext {
                pool_id: pool.id.clone(),
                existing_agents: pool.agents.iter().cloned().collect(),
                topics: pool.topics.iter().map(Topic::canonical).collect(),
                token: token.map(str::to_string),
            };
            if !policy.can_admit(agent_id, &context) {
                debug!(agent_id, pool_id, "admission policy rejected join");
                return Ok(false);
            }
        }

        if let Some(trust) = &pool.trust {
            let score = trust.get_trust(agent_id);
            if score < pool.trust_threshold {
                debug!(agent_id, pool_id, score, "trust below pool threshold");
                return Ok(false);
            }
        }

        pool.agents.insert(agent_id.to_string());
        let snapshot = pool.clone();
        self.persist(&snapshot)?;
        Ok(true)
    }

    /// Remove an agent from a pool; removing a non-member is a no-op
    pub fn leave_pool(&self, agent_id: &str, pool_id: &str) -> Result<()> {
        let mut pools = self.pools.lock();
        let Some(pool) = self.resolve(&mut pools, pool_id)? else {
            return Ok(());
        };
        pool.agents.remove(agent_id);
        let snapshot = pool.clone();
        self.persist(&snapshot)?;
        Ok(())
    }

    /// Retrieve a pool by id, loading from the store on a cache miss
    pub fn get_pool(&self, pool_id: &str) -> Result<Option<Pool>> {
        let mut pools = self.pools.lock();
        Ok(self.resolve(&mut pools, pool_id)?.map(|p| p.clone()))
    }

    /// Pool ids the agent is a member of, merging memory and store
    pub fn get_pools_for_agent(&self, agent_id: &str) -> Result<Vec<String>> {
        let pools = self.pools.lock();
        let mut result: Vec<String> = pools
            .iter()
            .filter(|(_, pool)| pool.agents.contains(agent_id))
            .map(|(id, _)| id.clone())
            .collect();

        for key in self.store.list(POOL_KEY_PREFIX)? {
            let pool_id = key.strip_prefix(POOL_KEY_PREFIX).unwrap_or(&key);
            if pools.contains_key(pool_id) {
                continue;
            }
            let Some(bytes) = self.store.get(&key)? else {
                continue;
            };
            match decode_pool(&bytes) {
                Ok(pool) if pool.agents.contains(agent_id) => result.push(pool_id.to_string()),
                Ok(_) => {}
                Err(e) => debug!(key, error = %e, "skipping malformed pool snapshot"),
            }
        }
        result.sort();
        Ok(result)
    }
}
