//! Task lifecycle management
//!
//! The manager is the source of truth for task state. One mutex guards the
//! whole in-memory state, which is what makes the claim check atomic: no two
//! callers can both observe PENDING and both transition to ASSIGNED.
//!
//! Every state transition writes the `task:<id>` snapshot to the store.
//! Snapshots are versioned JSON; a task loaded from the store in ASSIGNED
//! state gets its lease re-stamped on the current monotonic clock, since the
//! persisted reading belongs to a dead epoch.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use converge_core::{MemoryStore, Store};
use converge_types::{ConvergeError, Result, Task, TaskState};

use crate::monotonic_now;

/// Store key prefix for task snapshots
pub const TASK_KEY_PREFIX: &str = "task:";
/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct TaskSnapshot {
    v: u32,
    task: Task,
}

fn encode_task(task: &Task) -> Result<Vec<u8>> {
    serde_json::to_vec(&TaskSnapshot {
        v: SNAPSHOT_VERSION,
        task: task.clone(),
    })
    .map_err(|e| ConvergeError::serialization(e.to_string()))
}

fn decode_task(bytes: &[u8]) -> Result<Task> {
    let snapshot: TaskSnapshot =
        serde_json::from_slice(bytes).map_err(|e| ConvergeError::serialization(e.to_string()))?;
    if snapshot.v != SNAPSHOT_VERSION {
        return Err(ConvergeError::serialization(format!(
            "unsupported task snapshot version {}",
            snapshot.v
        )));
    }
    Ok(snapshot.task)
}

#[derive(Default)]
struct TaskManagerState {
    tasks: HashMap<String, Task>,
    pending: BTreeSet<String>,
}

impl TaskManagerState {
    /// Materialize a stored task into the cache. Re-stamps an ASSIGNED
    /// lease onto the current monotonic clock; registers PENDING tasks in
    /// the pending index.
    fn adopt(&mut self, mut task: Task) -> &mut Task {
        let id = task.id.clone();
        match task.state {
            TaskState::Pending => {
                self.pending.insert(id.clone());
            }
            TaskState::Assigned if task.claimed_at.is_some() => {
                task.claimed_at = Some(monotonic_now());
            }
            _ => {}
        }
        self.tasks.entry(id).or_insert(task)
    }
}

/// Manages tasks from submission to completion
pub struct TaskManager {
    store: Arc<dyn Store>,
    state: Mutex<TaskManagerState>,
}

impl TaskManager {
    /// Create a manager over the given store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            state: Mutex::new(TaskManagerState::default()),
        }
    }

    /// Create a manager over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn persist(&self, task: &Task) -> Result<()> {
        self.store
            .put(&format!("{TASK_KEY_PREFIX}{}", task.id), encode_task(task)?)
    }

    fn load<'a>(&self, state: &'a mut TaskManagerState, task_id: &str) -> Result<Option<&'a mut Task>> {
        if state.tasks.contains_key(task_id) {
            return Ok(state.tasks.get_mut(task_id));
        }
        let Some(bytes) = self.store.get(&format!("{TASK_KEY_PREFIX}{task_id}"))? else {
            return Ok(None);
        };
        let task = decode_task(&bytes)?;
        Ok(Some(state.adopt(task)))
    }

    /// Submit a new task, returning its id
    pub fn submit(&self, task: Task) -> Result<String> {
        let mut state = self.state.lock();
        let id = task.id.clone();
        self.persist(&task)?;
        if task.state == TaskState::Pending {
            state.pending.insert(id.clone());
        }
        state.tasks.insert(id.clone(), task);
        Ok(id)
    }

    /// Attempt to claim a task for an agent
    ///
    /// Succeeds if and only if the task exists and is PENDING. The check and
    /// transition happen under the manager mutex.
    pub fn claim(&self, agent_id: &str, task_id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let now = monotonic_now();
        let Some(task) = self.load(&mut state, task_id)? else {
            return Ok(false);
        };
        if task.state != TaskState::Pending {
            return Ok(false);
        }
        task.state = TaskState::Assigned;
        task.assigned_to = Some(agent_id.to_string());
        task.claimed_at = Some(now);
        let snapshot = task.clone();
        state.pending.remove(task_id);
        self.persist(&snapshot)?;
        Ok(true)
    }

    /// Report the result of a claimed task
    ///
    /// Reporting an unknown task is silent; reporting a task assigned to a
    /// different agent is a not-authorized error.
    pub fn report(&self, agent_id: &str, task_id: &str, result: Value) -> Result<()> {
        let mut state = self.state.lock();
        let Some(task) = self.load(&mut state, task_id)? else {
            return Ok(());
        };
        if task.assigned_to.as_deref() != Some(agent_id) {
            return Err(ConvergeError::NotAuthorized {
                agent_id: agent_id.to_string(),
                task_id: task_id.to_string(),
            });
        }
        task.result = Some(result);
        task.state = TaskState::Completed;
        let snapshot = task.clone();
        self.persist(&snapshot)?;
        Ok(())
    }

    /// Mark a task FAILED with a reason
    ///
    /// With `agent_id` set, only the assigned agent may fail the task.
    /// Returns false if the task is unknown or already terminal.
    pub fn fail_task(&self, task_id: &str, reason: Value, agent_id: Option<&str>) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(task) = self.load(&mut state, task_id)? else {
            return Ok(false);
        };
        if let Some(agent_id) = agent_id {
            if task.assigned_to.as_deref() != Some(agent_id) {
                return Err(ConvergeError::NotAuthorized {
                    agent_id: agent_id.to_string(),
                    task_id: task_id.to_string(),
                });
            }
        }
        if task.state.is_terminal() {
            return Ok(false);
        }
        task.state = TaskState::Failed;
        task.result = Some(reason);
        task.claimed_at = None;
        let snapshot = task.clone();
        state.pending.remove(task_id);
        self.persist(&snapshot)?;
        Ok(true)
    }

    /// Cancel a task from any non-terminal state
    pub fn cancel_task(&self, task_id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(task) = self.load(&mut state, task_id)? else {
            return Ok(false);
        };
        if task.state.is_terminal() {
            return Ok(false);
        }
        task.state = TaskState::Cancelled;
        task.assigned_to = None;
        task.claimed_at = None;
        let snapshot = task.clone();
        state.pending.remove(task_id);
        self.persist(&snapshot)?;
        Ok(true)
    }

    /// Release claims whose lease elapsed, returning the released task ids
    ///
    /// Scans the in-memory tasks and, deduplicated against them, the store.
    /// Tasks without a numeric `claim_ttl_sec` constraint never expire.
    pub fn release_expired_claims(&self, now: f64) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let mut released = Vec::new();

        // Pull store-only tasks into the cache first so one pass covers both.
        for key in self.store.list(TASK_KEY_PREFIX)? {
            let task_id = key.strip_prefix(TASK_KEY_PREFIX).unwrap_or(&key);
            if state.tasks.contains_key(task_id) {
                continue;
            }
            let Some(bytes) = self.store.get(&key)? else {
                continue;
            };
            match decode_task(&bytes) {
                Ok(task) => {
                    state.adopt(task);
                }
                Err(e) => debug!(key, error = %e, "skipping malformed task snapshot"),
            }
        }

        let expired: Vec<String> = state
            .tasks
            .values()
            .filter(|task| {
                task.state == TaskState::Assigned
                    && match (task.claimed_at, task.claim_ttl_sec()) {
                        (Some(claimed_at), Some(ttl)) => now - claimed_at >= ttl,
                        _ => false,
                    }
            })
            .map(|task| task.id.clone())
            .collect();

        for task_id in expired {
            let Some(task) = state.tasks.get_mut(&task_id) else {
                continue;
            };
            task.state = TaskState::Pending;
            task.assigned_to = None;
            task.claimed_at = None;
            let snapshot = task.clone();
            state.pending.insert(task_id.clone());
            self.persist(&snapshot)?;
            released.push(task_id);
        }
        Ok(released)
    }

    /// Retrieve a task by id, loading from the store on a cache miss
    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let mut state = self.state.lock();
        Ok(self.load(&mut state, task_id)?.map(|t| t.clone()))
    }

    /// All tasks currently in the PENDING state
    pub fn list_pending_tasks(&self) -> Vec<Task> {
        let state = self.state.lock();
        state
            .pending
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .cloned()
            .collect()
    }

    /// Pending tasks visible to an agent given pools and capabilities
    ///
    /// A `None` filter disables that predicate. A task with a `pool_id`
    /// requires membership; required capabilities must be a subset of the
    /// agent's.
    pub fn list_pending_tasks_for_agent(
        &self,
        _agent_id: &str,
        pool_ids: Option<&[String]>,
        capabilities: Option<&[String]>,
    ) -> Vec<Task> {
        self.list_pending_tasks()
            .into_iter()
            .filter(|task| {
                if let (Some(task_pool), Some(pools)) = (task.pool_id.as_deref(), pool_ids) {
                    if !pools.iter().any(|p| p == task_pool) {
                        return false;
                    }
                }
                if let Some(caps) = capabilities {
                    if !task.required_capabilities.is_empty()
                        && !task
                            .required_capabilities
                            .iter()
                            .all(|required| caps.iter().any(|c| c == required))
                    {
                        return false;
                    }
                }
                true
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_types::CLAIM_TTL_KEY;

    fn manager() -> TaskManager {
        TaskManager::in_memory()
    }

    #[test]
    fn test_submit_and_claim() {
        let tm = manager();
        let id = tm.submit(Task::new()).unwrap();
        assert_eq!(tm.list_pending_tasks().len(), 1);

        assert!(tm.claim("agent1", &id).unwrap());
        let task = tm.get_task(&id).unwrap().unwrap();
        assert_eq!(task.state, TaskState::Assigned);
        assert_eq!(task.assigned_to.as_deref(), Some("agent1"));
        assert!(task.claimed_at.is_some());
        assert!(tm.list_pending_tasks().is_empty());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let tm = manager();
        let id = tm.submit(Task::new()).unwrap();
        assert!(tm.claim("agent1", &id).unwrap());
        assert!(!tm.claim("agent2", &id).unwrap());
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let tm = Arc::new(manager());
        let id = tm.submit(Task::new()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tm = Arc::clone(&tm);
                let id = id.clone();
                std::thread::spawn(move || tm.claim(&format!("agent{i}"), &id).unwrap())
            })
            .collect();
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_claim_unknown_task() {
        assert!(!manager().claim("agent1", "missing").unwrap());
    }

    #[test]
    fn test_report_requires_assignee() {
        let tm = manager();
        let id = tm.submit(Task::new()).unwrap();
        tm.claim("agent1", &id).unwrap();

        let err = tm.report("agent2", &id, Value::from("done")).unwrap_err();
        assert!(matches!(err, ConvergeError::NotAuthorized { .. }));

        tm.report("agent1", &id, Value::from("done")).unwrap();
        let task = tm.get_task(&id).unwrap().unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.result, Some(Value::from("done")));
    }

    #[test]
    fn test_report_unknown_task_is_silent() {
        manager().report("agent1", "missing", Value::Null).unwrap();
    }

    #[test]
    fn test_fail_task_authorization() {
        let tm = manager();
        let id = tm.submit(Task::new()).unwrap();
        tm.claim("agent1", &id).unwrap();

        assert!(matches!(
            tm.fail_task(&id, Value::from("boom"), Some("agent2")),
            Err(ConvergeError::NotAuthorized { .. })
        ));
        assert!(tm.fail_task(&id, Value::from("boom"), Some("agent1")).unwrap());
        assert_eq!(
            tm.get_task(&id).unwrap().unwrap().state,
            TaskState::Failed
        );
        // Terminal: further transitions rejected.
        assert!(!tm.fail_task(&id, Value::Null, None).unwrap());
        assert!(!tm.cancel_task(&id).unwrap());
        assert!(!tm.claim("agent1", &id).unwrap());
    }

    #[test]
    fn test_cancel_pending_and_assigned() {
        let tm = manager();
        let pending = tm.submit(Task::new()).unwrap();
        assert!(tm.cancel_task(&pending).unwrap());
        assert_eq!(
            tm.get_task(&pending).unwrap().unwrap().state,
            TaskState::Cancelled
        );
        assert!(tm.list_pending_tasks().is_empty());

        let assigned = tm.submit(Task::new()).unwrap();
        tm.claim("agent1", &assigned).unwrap();
        assert!(tm.cancel_task(&assigned).unwrap());
        let task = tm.get_task(&assigned).unwrap().unwrap();
        assert_eq!(task.state, TaskState::Cancelled);
        assert!(task.assigned_to.is_none());
    }

    #[test]
    fn test_release_expired_claims() {
        let tm = manager();
        let id = tm
            .submit(Task::new().with_constraint(CLAIM_TTL_KEY, 0.1))
            .unwrap();
        tm.claim("agent1", &id).unwrap();

        let claimed_at = tm.get_task(&id).unwrap().unwrap().claimed_at.unwrap();
        // Before the lease elapses nothing is released.
        assert!(tm.release_expired_claims(claimed_at + 0.05).unwrap().is_empty());

        let released = tm.release_expired_claims(claimed_at + 0.2).unwrap();
        assert_eq!(released, vec![id.clone()]);
        let task = tm.get_task(&id).unwrap().unwrap();
        assert_eq!(task.state, TaskState::Pending);
        assert!(task.assigned_to.is_none());
        assert!(task.claimed_at.is_none());
        assert_eq!(tm.list_pending_tasks().len(), 1);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let tm = manager();
        let id = tm.submit(Task::new()).unwrap();
        tm.claim("agent1", &id).unwrap();
        let released = tm.release_expired_claims(monotonic_now() + 1e6).unwrap();
        assert!(released.is_empty());
        assert_eq!(
            tm.get_task(&id).unwrap().unwrap().state,
            TaskState::Assigned
        );
    }

    #[test]
    fn test_cold_start_loads_from_store() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let id = {
            let tm = TaskManager::new(Arc::clone(&store));
            tm.submit(Task::new()).unwrap()
        };

        let tm = TaskManager::new(store);
        let task = tm.get_task(&id).unwrap().unwrap();
        assert_eq!(task.state, TaskState::Pending);
        // Loading a pending task re-registers it in the pending index.
        assert_eq!(tm.list_pending_tasks().len(), 1);
    }

    #[test]
    fn test_cold_start_restamps_assigned_lease() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let id = {
            let tm = TaskManager::new(Arc::clone(&store));
            let id = tm
                .submit(Task::new().with_constraint(CLAIM_TTL_KEY, 1000.0))
                .unwrap();
            tm.claim("agent1", &id).unwrap();
            id
        };

        let tm = TaskManager::new(store);
        let before = monotonic_now();
        let task = tm.get_task(&id).unwrap().unwrap();
        assert_eq!(task.state, TaskState::Assigned);
        // The lease restarts on this process's clock rather than the old epoch.
        assert!(task.claimed_at.unwrap() >= before - 1.0);
    }

    #[test]
    fn test_visibility_filter() {
        let tm = manager();
        tm.submit(Task::new().with_pool("pool-a")).unwrap();
        tm.submit(Task::new()).unwrap();
        let mut gated = Task::new();
        gated.required_capabilities = vec!["gpu".to_string()];
        tm.submit(gated).unwrap();

        // No filters: everything pending is visible.
        assert_eq!(tm.list_pending_tasks_for_agent("a", None, None).len(), 3);

        // Wrong pool hides the pool task; missing capability hides the gated one.
        let visible = tm.list_pending_tasks_for_agent(
            "a",
            Some(&["pool-b".to_string()]),
            Some(&["cpu".to_string()]),
        );
        assert_eq!(visible.len(), 1);

        // Matching pool and capability expose all three.
        let visible = tm.list_pending_tasks_for_agent(
            "a",
            Some(&["pool-a".to_string()]),
            Some(&["gpu".to_string()]),
        );
        assert_eq!(visible.len(), 3);
    }
}
