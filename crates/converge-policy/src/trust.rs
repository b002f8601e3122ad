//! Trust scoring
//!
//! Trust scores live in [0, 1]; unknown agents start at a neutral 0.5.
//! Pools with a trust threshold reject joiners below it.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Neutral score for agents with no history
pub const NEUTRAL_TRUST: f64 = 0.5;

/// Source of trust scores consulted by pool admission
pub trait TrustModel: Send + Sync {
    /// Current trust score for an agent, in [0, 1]
    fn get_trust(&self, agent_id: &str) -> f64;
}

/// In-memory trust score table updated by interaction feedback
#[derive(Debug, Default)]
pub struct TrustScores {
    scores: RwLock<HashMap<String, f64>>,
}

impl TrustScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a score delta, clamping the result to [0, 1]
    pub fn update_trust(&self, agent_id: &str, delta: f64) -> f64 {
        let mut scores = self.scores.write();
        let current = scores.get(agent_id).copied().unwrap_or(NEUTRAL_TRUST);
        let updated = (current + delta).clamp(0.0, 1.0);
        scores.insert(agent_id.to_string(), updated);
        updated
    }
}

impl TrustModel for TrustScores {
    fn get_trust(&self, agent_id: &str) -> f64 {
        self.scores
            .read()
            .get(agent_id)
            .copied()
            .unwrap_or(NEUTRAL_TRUST)
    }
}
