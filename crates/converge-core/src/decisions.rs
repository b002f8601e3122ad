//! Agent decisions
//!
//! `Decision` is a closed sum type: agents emit a batch per tick and the
//! executor dispatches each variant to the matching manager, protocol, or
//! transport. Extension happens through `Custom`, which the executor routes
//! to registered handlers by kind.

use std::sync::Arc;

use serde_json::{Map, Value};

use converge_policy::{AdmissionPolicy, TrustModel};
use converge_types::{Task, Topic};

use crate::Message;

/// Specification for creating a pool
#[derive(Clone, Default)]
pub struct PoolSpec {
    /// Explicit pool id; a UUID is assigned when absent
    pub id: Option<String>,
    /// Topics associated with the pool
    pub topics: Vec<Topic>,
    /// Governance rules, opaque to the manager
    pub governance: Map<String, Value>,
    /// Admission policy evaluated on join
    pub admission: Option<Arc<dyn AdmissionPolicy>>,
    /// Trust source consulted against `trust_threshold` on join
    pub trust: Option<Arc<dyn TrustModel>>,
    /// Minimum trust score required to join, in [0, 1]
    pub trust_threshold: f64,
}

impl PoolSpec {
    /// Spec with a fixed pool id and no gates
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for PoolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSpec")
            .field("id", &self.id)
            .field("topics", &self.topics)
            .field("governance", &self.governance)
            .field("has_admission", &self.admission.is_some())
            .field("has_trust", &self.trust.is_some())
            .field("trust_threshold", &self.trust_threshold)
            .finish()
    }
}

/// An action an agent instructs the executor to perform
#[derive(Debug, Clone)]
pub enum Decision {
    /// Send a message; signed with the agent identity if unsigned
    SendMessage { message: Message },
    /// Submit a task to the task manager
    SubmitTask { task: Task },
    /// Attempt an exclusive claim of a pending task
    ClaimTask { task_id: String },
    /// Report the result of a claimed task
    ReportTask { task_id: String, result: Value },
    /// Join a pool
    JoinPool { pool_id: String },
    /// Leave a pool
    LeavePool { pool_id: String },
    /// Create a pool from a spec
    CreatePool { spec: PoolSpec },
    /// Submit a bid to an auction
    SubmitBid {
        auction_id: String,
        amount: f64,
        content: Option<Value>,
    },
    /// Record a vote for later resolution
    Vote { vote_id: String, option: Value },
    /// Make or counter a proposal in a negotiation session
    Propose { session_id: String, content: Value },
    /// Accept the current proposal in a session
    AcceptProposal { session_id: String },
    /// Reject the current proposal and close the session
    RejectProposal { session_id: String },
    /// Grant a scoped mandate to another agent
    Delegate {
        delegatee_id: String,
        scope: Vec<String>,
    },
    /// Revoke a delegation
    RevokeDelegation { delegation_id: String },
    /// Run a registered tool off the loop thread
    InvokeTool {
        tool_name: String,
        params: Map<String, Value>,
    },
    /// User-defined decision routed to a registered custom handler
    Custom { kind: String, data: Value },
}

impl Decision {
    /// The decision's kind name, as checked by `ActionPolicy` allowlists
    pub fn kind(&self) -> &str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::SubmitTask { .. } => "submit_task",
            Self::ClaimTask { .. } => "claim_task",
            Self::ReportTask { .. } => "report_task",
            Self::JoinPool { .. } => "join_pool",
            Self::LeavePool { .. } => "leave_pool",
            Self::CreatePool { .. } => "create_pool",
            Self::SubmitBid { .. } => "submit_bid",
            Self::Vote { .. } => "vote",
            Self::Propose { .. } => "propose",
            Self::AcceptProposal { .. } => "accept_proposal",
            Self::RejectProposal { .. } => "reject_proposal",
            Self::Delegate { .. } => "delegate",
            Self::RevokeDelegation { .. } => "revoke_delegation",
            Self::InvokeTool { .. } => "invoke_tool",
            Self::Custom { kind, .. } => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let decision = Decision::ClaimTask {
            task_id: "t1".to_string(),
        };
        assert_eq!(decision.kind(), "claim_task");

        let custom = Decision::Custom {
            kind: "audit_ping".to_string(),
            data: Value::Null,
        };
        assert_eq!(custom.kind(), "audit_ping");
    }
}
