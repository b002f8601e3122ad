//! End-to-end scenarios over full agent runtimes

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use converge_coordination::{monotonic_now, PoolManager, TaskManager};
use converge_core::{Agent, Decision, FileStore, Message, PoolSpec, Store};
use converge_crypto::Identity;
use converge_network::{IdentityRegistry, LocalTransport, LocalTransportRegistry, Transport};
use converge_runtime::AgentRuntime;
use converge_types::{Task, TaskState, CLAIM_TTL_KEY};

/// Replies `pong` to every `ping` it sees
struct Responder {
    identity: Identity,
}

#[async_trait]
impl Agent for Responder {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn decide(&mut self, messages: Vec<Message>, _tasks: Vec<Task>) -> Vec<Decision> {
        messages
            .into_iter()
            .filter(|m| m.payload.get("content") == Some(&Value::from("ping")))
            .map(|m| {
                let mut payload = serde_json::Map::new();
                payload.insert("content".to_string(), Value::from("pong"));
                payload.insert("reply_to".to_string(), Value::from(m.id.clone()));
                Decision::SendMessage {
                    message: Message::new(payload).to_recipient(m.sender.clone()),
                }
            })
            .collect()
    }
}

/// Records every message it sees
struct Collector {
    identity: Identity,
    seen: Arc<Mutex<Vec<Message>>>,
}

#[async_trait]
impl Agent for Collector {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn decide(&mut self, messages: Vec<Message>, _tasks: Vec<Task>) -> Vec<Decision> {
        self.seen.lock().extend(messages);
        Vec::new()
    }
}

/// Claims the first pending task it sees and reports a fixed result
struct Claimer {
    identity: Identity,
    result: Value,
}

#[async_trait]
impl Agent for Claimer {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn decide(&mut self, _messages: Vec<Message>, tasks: Vec<Task>) -> Vec<Decision> {
        tasks
            .first()
            .map(|task| {
                vec![
                    Decision::ClaimTask {
                        task_id: task.id.clone(),
                    },
                    Decision::ReportTask {
                        task_id: task.id.clone(),
                        result: self.result.clone(),
                    },
                ]
            })
            .unwrap_or_default()
    }
}

async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn test_ping_pong_between_runtimes() {
    let registry = Arc::new(LocalTransportRegistry::new());

    let a_identity = Identity::generate();
    let a_id = a_identity.fingerprint().to_string();
    let a_transport = Arc::new(LocalTransport::with_registry(a_id.clone(), Arc::clone(&registry)));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let a = AgentRuntime::builder(
        Box::new(Collector {
            identity: a_identity,
            seen: Arc::clone(&seen),
        }),
        Arc::clone(&a_transport) as Arc<dyn Transport>,
    )
    .build();

    let b_identity = Identity::generate();
    let b_id = b_identity.fingerprint().to_string();
    let b_transport = Arc::new(LocalTransport::with_registry(b_id.clone(), Arc::clone(&registry)));
    let b = AgentRuntime::builder(
        Box::new(Responder { identity: b_identity }),
        b_transport as Arc<dyn Transport>,
    )
    .build();

    a.start().await.unwrap();
    b.start().await.unwrap();

    let ping = Message::with_content("ping")
        .from_sender(a_id)
        .to_recipient(b_id);
    let ping_id = ping.id.clone();
    a_transport.send(&ping).await.unwrap();

    let arrived = wait_until(Duration::from_secs(2), || {
        seen.lock().iter().any(|m| {
            m.payload.get("content") == Some(&Value::from("pong"))
                && m.payload.get("reply_to") == Some(&Value::from(ping_id.clone()))
        })
    })
    .await;
    assert!(arrived, "pong with reply_to did not arrive within 2s");

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_verified_receive_drops_unknown_sender() {
    let registry = Arc::new(LocalTransportRegistry::new());

    let a_identity = Identity::generate();
    let a_id = a_identity.fingerprint().to_string();
    let a_transport = Arc::new(LocalTransport::with_registry(a_id.clone(), Arc::clone(&registry)));
    a_transport.start().await.unwrap();

    let b_identity = Identity::generate();
    let b_id = b_identity.fingerprint().to_string();
    let b_transport = Arc::new(LocalTransport::with_registry(b_id.clone(), Arc::clone(&registry)));

    let known = Arc::new(IdentityRegistry::new());
    known.register(a_id.clone(), a_identity.public_key_bytes().to_vec());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let b = AgentRuntime::builder(
        Box::new(Collector {
            identity: b_identity,
            seen: Arc::clone(&seen),
        }),
        b_transport as Arc<dyn Transport>,
    )
    .identity_registry(known)
    .build();
    b.start().await.unwrap();

    // A properly signed message is delivered.
    let signed = Message::with_content("hello")
        .to_recipient(b_id.clone())
        .sign(&a_identity)
        .unwrap();
    a_transport.send(&signed).await.unwrap();

    // A forged message from an unknown sender is dropped.
    let forged = Message::with_content("evil")
        .from_sender("unknown_agent")
        .to_recipient(b_id.clone());
    a_transport.send(&forged).await.unwrap();

    wait_until(Duration::from_secs(2), || !seen.lock().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 1, "exactly one verified message should arrive");
    assert_eq!(seen[0].id, signed.id);

    b.stop().await.unwrap();
    a_transport.stop().await.unwrap();
}

#[tokio::test]
async fn test_two_agents_one_claim_wins() {
    let registry = Arc::new(LocalTransportRegistry::new());
    let tm = Arc::new(TaskManager::in_memory());
    let pm = Arc::new(PoolManager::in_memory());
    pm.create_pool(PoolSpec::with_id("P")).unwrap();

    let mut runtimes = Vec::new();
    for _ in 0..2 {
        let identity = Identity::generate();
        let agent_id = identity.fingerprint().to_string();
        pm.join_pool(&agent_id, "P").unwrap();
        let transport = Arc::new(LocalTransport::with_registry(
            agent_id,
            Arc::clone(&registry),
        ));
        let runtime = AgentRuntime::builder(
            Box::new(Claimer {
                identity,
                result: serde_json::json!({"status": "done"}),
            }),
            transport as Arc<dyn Transport>,
        )
        .task_manager(Arc::clone(&tm))
        .pool_manager(Arc::clone(&pm))
        .build();
        runtime.start().await.unwrap();
        runtimes.push(runtime);
    }

    let task = Task::new().with_pool("P");
    let task_id = task.id.clone();
    tm.submit(task).unwrap();
    for runtime in &runtimes {
        runtime.scheduler().notify();
    }

    let completed = wait_until(Duration::from_secs(5), || {
        tm.get_task(&task_id)
            .ok()
            .flatten()
            .map(|t| t.state == TaskState::Completed)
            .unwrap_or(false)
    })
    .await;
    assert!(completed, "task should complete within 5s");

    let task = tm.get_task(&task_id).unwrap().unwrap();
    assert_eq!(task.result, Some(serde_json::json!({"status": "done"})));

    for runtime in runtimes {
        runtime.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_claim_ttl_recovery_by_second_agent() {
    let registry = Arc::new(LocalTransportRegistry::new());
    let tm = Arc::new(TaskManager::in_memory());

    let task = Task::new().with_constraint(CLAIM_TTL_KEY, 0.1);
    let task_id = task.id.clone();
    tm.submit(task).unwrap();

    // Agent 1 claims and goes dark without reporting.
    assert!(tm.claim("agent1", &task_id).unwrap());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let released = tm.release_expired_claims(monotonic_now()).unwrap();
    assert_eq!(released, vec![task_id.clone()]);
    assert_eq!(
        tm.get_task(&task_id).unwrap().unwrap().state,
        TaskState::Pending
    );

    // Agent 2 picks the task back up through a full runtime.
    let identity = Identity::generate();
    let agent_id = identity.fingerprint().to_string();
    let transport = Arc::new(LocalTransport::with_registry(agent_id, registry));
    let runtime = AgentRuntime::builder(
        Box::new(Claimer {
            identity,
            result: Value::from("recovered"),
        }),
        transport as Arc<dyn Transport>,
    )
    .task_manager(Arc::clone(&tm))
    .build();
    runtime.start().await.unwrap();

    let completed = wait_until(Duration::from_secs(5), || {
        tm.get_task(&task_id)
            .ok()
            .flatten()
            .map(|t| t.state == TaskState::Completed)
            .unwrap_or(false)
    })
    .await;
    assert!(completed);
    assert_eq!(
        tm.get_task(&task_id).unwrap().unwrap().result,
        Some(Value::from("recovered"))
    );

    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_recovery_over_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let task_id;

    // First life: submit a task, create a pool with a member, shut down.
    {
        let store: Arc<dyn Store> = Arc::new(FileStore::new(dir.path()).unwrap());
        let tm = TaskManager::new(Arc::clone(&store));
        let pm = PoolManager::new(store);

        task_id = tm.submit(Task::new()).unwrap();
        pm.create_pool(PoolSpec::with_id("P")).unwrap();
        pm.join_pool("agent1", "P").unwrap();
    }

    // Second life: fresh managers over the same store see the old state.
    let store: Arc<dyn Store> = Arc::new(FileStore::new(dir.path()).unwrap());
    let tm = Arc::new(TaskManager::new(Arc::clone(&store)));
    let pm = Arc::new(PoolManager::new(store));

    assert!(pm.get_pool("P").unwrap().unwrap().agents.contains("agent1"));
    assert_eq!(
        tm.get_task(&task_id).unwrap().unwrap().state,
        TaskState::Pending
    );

    // A new runtime resumes the task to completion.
    let registry = Arc::new(LocalTransportRegistry::new());
    let identity = Identity::generate();
    let agent_id = identity.fingerprint().to_string();
    let transport = Arc::new(LocalTransport::with_registry(agent_id, registry));
    let runtime = AgentRuntime::builder(
        Box::new(Claimer {
            identity,
            result: Value::from("resumed"),
        }),
        transport as Arc<dyn Transport>,
    )
    .task_manager(Arc::clone(&tm))
    .build();
    runtime.start().await.unwrap();

    let completed = wait_until(Duration::from_secs(5), || {
        tm.get_task(&task_id)
            .ok()
            .flatten()
            .map(|t| t.state == TaskState::Completed)
            .unwrap_or(false)
    })
    .await;
    assert!(completed);

    runtime.stop().await.unwrap();
}
