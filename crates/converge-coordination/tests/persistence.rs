//! Manager persistence across process lifetimes
//!
//! Both managers treat the store as the source of truth on cache miss, so a
//! fresh manager over the same store resumes exactly where the old one
//! stopped.

use std::sync::Arc;

use serde_json::Value;

use converge_coordination::{monotonic_now, PoolManager, TaskManager};
use converge_core::{FileStore, PoolSpec, Store};
use converge_policy::WhitelistAdmission;
use converge_types::{Task, TaskState, CLAIM_TTL_KEY};

#[test]
fn test_task_lifecycle_survives_manager_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(FileStore::new(dir.path()).unwrap());

    let task_id = {
        let tm = TaskManager::new(Arc::clone(&store));
        let id = tm.submit(Task::new()).unwrap();
        assert!(tm.claim("agent1", &id).unwrap());
        tm.report("agent1", &id, Value::from("finished")).unwrap();
        id
    };

    let tm = TaskManager::new(store);
    let task = tm.get_task(&task_id).unwrap().unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.result, Some(Value::from("finished")));
    // Terminal tasks never reappear as pending.
    assert!(tm.list_pending_tasks().is_empty());
}

#[test]
fn test_pending_task_is_claimable_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(FileStore::new(dir.path()).unwrap());

    let task_id = {
        let tm = TaskManager::new(Arc::clone(&store));
        tm.submit(Task::new()).unwrap()
    };

    let tm = TaskManager::new(store);
    assert!(tm.claim("agent2", &task_id).unwrap());
    tm.report("agent2", &task_id, Value::from("after restart"))
        .unwrap();
    assert_eq!(
        tm.get_task(&task_id).unwrap().unwrap().state,
        TaskState::Completed
    );
}

#[test]
fn test_lease_restarts_after_reload_then_expires() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(FileStore::new(dir.path()).unwrap());

    let task_id = {
        let tm = TaskManager::new(Arc::clone(&store));
        let id = tm
            .submit(Task::new().with_constraint(CLAIM_TTL_KEY, 0.05))
            .unwrap();
        assert!(tm.claim("agent1", &id).unwrap());
        id
    };

    // The new manager re-stamps the lease on load, so the task is still
    // assigned immediately after restart.
    let tm = TaskManager::new(store);
    assert!(tm.release_expired_claims(monotonic_now()).unwrap().is_empty());

    std::thread::sleep(std::time::Duration::from_millis(100));
    let released = tm.release_expired_claims(monotonic_now()).unwrap();
    assert_eq!(released, vec![task_id.clone()]);
    assert_eq!(
        tm.get_task(&task_id).unwrap().unwrap().state,
        TaskState::Pending
    );
}

#[test]
fn test_pool_membership_and_admission_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(FileStore::new(dir.path()).unwrap());

    {
        let pm = PoolManager::new(Arc::clone(&store));
        let spec = PoolSpec {
            id: Some("gated".to_string()),
            admission: Some(Arc::new(WhitelistAdmission::new(["agent_x"]))),
            ..Default::default()
        };
        pm.create_pool(spec).unwrap();
        assert!(!pm.join_pool("agent_y", "gated").unwrap());
        assert!(pm.join_pool("agent_x", "gated").unwrap());
    }

    // Policies are process-local; the reloaded pool keeps its members and,
    // with no policy attached, admits freely.
    let pm = PoolManager::new(store);
    let pool = pm.get_pool("gated").unwrap().unwrap();
    assert!(pool.agents.contains("agent_x"));
    assert!(!pool.agents.contains("agent_y"));
    assert!(pm.join_pool("agent_z", "gated").unwrap());
}
