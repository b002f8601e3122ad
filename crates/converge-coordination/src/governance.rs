//! Pool governance models

use serde_json::{Map, Value};

use crate::majority_vote;

/// How decisions are made within a pool
pub trait GovernanceModel: Send + Sync {
    /// Resolve a dispute or deadlock from a ballot context
    fn resolve_dispute(&self, context: &Map<String, Value>) -> Option<Value>;
}

/// A single leader makes all critical decisions
#[derive(Debug, Clone)]
pub struct DictatorialGovernance {
    pub leader_id: String,
}

impl DictatorialGovernance {
    pub fn new(leader_id: impl Into<String>) -> Self {
        Self {
            leader_id: leader_id.into(),
        }
    }
}

impl GovernanceModel for DictatorialGovernance {
    fn resolve_dispute(&self, _context: &Map<String, Value>) -> Option<Value> {
        Some(Value::String(format!("Decided by {}", self.leader_id)))
    }
}

/// Decisions made by majority vote over `context["votes"]`
#[derive(Debug, Clone, Copy, Default)]
pub struct DemocraticGovernance;

impl GovernanceModel for DemocraticGovernance {
    fn resolve_dispute(&self, context: &Map<String, Value>) -> Option<Value> {
        let votes = context
            .get("votes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        majority_vote(&votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dictatorial() {
        let gov = DictatorialGovernance::new("leader-1");
        let decision = gov.resolve_dispute(&Map::new()).unwrap();
        assert_eq!(decision, json!("Decided by leader-1"));
    }

    #[test]
    fn test_democratic_majority() {
        let gov = DemocraticGovernance;
        let mut context = Map::new();
        context.insert("votes".to_string(), json!(["a", "a", "b"]));
        assert_eq!(gov.resolve_dispute(&context), Some(json!("a")));
    }

    #[test]
    fn test_democratic_without_majority() {
        let gov = DemocraticGovernance;
        let mut context = Map::new();
        context.insert("votes".to_string(), json!(["a", "b"]));
        assert_eq!(gov.resolve_dispute(&context), None);
        assert_eq!(gov.resolve_dispute(&Map::new()), None);
    }
}
