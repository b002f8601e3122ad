//! The agent seam
//!
//! User logic implements `Agent`; the runtime owns the loop and calls in.
//! `decide` is async so implementations may block or await freely; the
//! runtime serializes all calls for one agent on its loop task.

use async_trait::async_trait;

use converge_crypto::Identity;
use converge_types::{Task, Topic};

use crate::{Decision, Message};

/// Autonomous decision logic driven by an `AgentRuntime`
#[async_trait]
pub trait Agent: Send {
    /// The agent's cryptographic identity; its fingerprint is the agent id
    fn identity(&self) -> &Identity;

    /// The agent's stable identifier (identity fingerprint)
    fn id(&self) -> String {
        self.identity().fingerprint().to_string()
    }

    /// Capability names this agent possesses, used for task visibility
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Topics this agent is interested in, used for discovery
    fn topics(&self) -> Vec<Topic> {
        Vec::new()
    }

    /// Called when the runtime starts
    fn on_start(&mut self) {}

    /// Called when the runtime stops
    fn on_stop(&mut self) {}

    /// Called each loop iteration before `decide`
    fn on_tick(&mut self, _messages: &[Message], _tasks: &[Task]) {}

    /// Produce decisions from inbox messages and visible pending tasks
    async fn decide(&mut self, messages: Vec<Message>, tasks: Vec<Task>) -> Vec<Decision>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet {
        identity: Identity,
    }

    #[async_trait]
    impl Agent for Quiet {
        fn identity(&self) -> &Identity {
            &self.identity
        }

        async fn decide(&mut self, _messages: Vec<Message>, _tasks: Vec<Task>) -> Vec<Decision> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_id_is_fingerprint() {
        let identity = Identity::generate();
        let fingerprint = identity.fingerprint().to_string();
        let mut agent = Quiet { identity };
        assert_eq!(agent.id(), fingerprint);
        assert!(agent.decide(Vec::new(), Vec::new()).await.is_empty());
    }
}
