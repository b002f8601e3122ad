//! Negotiation sessions
//!
//! Sessions move `Proposed → Countered* → Accepted | Rejected`. Only
//! participants may act; accepted and rejected sessions are closed to
//! further proposals.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// State of a negotiation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Proposed,
    Countered,
    Accepted,
    Rejected,
    Closed,
}

impl NegotiationState {
    fn is_open(&self) -> bool {
        matches!(self, Self::Proposed | Self::Countered)
    }
}

/// A proposal within a negotiation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub proposer_id: String,
    pub content: Value,
    pub timestamp: i64,
}

impl Proposal {
    fn new(proposer_id: &str, content: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            proposer_id: proposer_id.to_string(),
            content,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// The state of a negotiation between agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub id: String,
    pub participants: Vec<String>,
    pub history: Vec<Proposal>,
    pub state: NegotiationState,
    pub current_proposal: Option<Proposal>,
}

/// Manages negotiation sessions and their transitions
#[derive(Default)]
pub struct NegotiationProtocol {
    sessions: Mutex<HashMap<String, NegotiationSession>>,
}

impl NegotiationProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session with an initial proposal, returning its id
    pub fn create_session(
        &self,
        initiator_id: &str,
        participants: Vec<String>,
        initial_proposal: Value,
    ) -> String {
        let proposal = Proposal::new(initiator_id, initial_proposal);
        let mut all = vec![initiator_id.to_string()];
        all.extend(participants);
        let session = NegotiationSession {
            id: Uuid::new_v4().to_string(),
            participants: all,
            history: vec![proposal.clone()],
            state: NegotiationState::Proposed,
            current_proposal: Some(proposal),
        };
        let id = session.id.clone();
        self.sessions.lock().insert(id.clone(), session);
        id
    }

    /// Make a counter-proposal in an open session
    pub fn propose(&self, session_id: &str, agent_id: &str, content: Value) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        if !session.state.is_open() || !session.participants.iter().any(|p| p == agent_id) {
            return false;
        }
        let proposal = Proposal::new(agent_id, content);
        session.history.push(proposal.clone());
        session.current_proposal = Some(proposal);
        session.state = NegotiationState::Countered;
        true
    }

    /// Accept the current proposal
    pub fn accept(&self, session_id: &str, agent_id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        if session.current_proposal.is_none()
            || !session.participants.iter().any(|p| p == agent_id)
        {
            return false;
        }
        session.state = NegotiationState::Accepted;
        true
    }

    /// Reject the current proposal and close the session
    pub fn reject(&self, session_id: &str, agent_id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        if !session.participants.iter().any(|p| p == agent_id) {
            return false;
        }
        session.state = NegotiationState::Rejected;
        true
    }

    /// Retrieve a session snapshot by id
    pub fn get_session(&self, session_id: &str) -> Option<NegotiationSession> {
        self.sessions.lock().get(session_id).cloned()
    }
}
