//! Auction-based coordination
//!
//! One protocol instance tracks one auction. Bids overwrite per agent;
//! resolution closes the auction.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Auction mechanism tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionType {
    FirstPriceSealedBid,
    SecondPriceSealedBid,
    English,
    Dutch,
}

struct AuctionState {
    bids: HashMap<String, f64>,
    active: bool,
}

/// Manages one auction's bid lifecycle
pub struct BiddingProtocol {
    auction_type: AuctionType,
    state: Mutex<AuctionState>,
}

impl BiddingProtocol {
    pub fn new(auction_type: AuctionType) -> Self {
        Self {
            auction_type,
            state: Mutex::new(AuctionState {
                bids: HashMap::new(),
                active: true,
            }),
        }
    }

    pub fn auction_type(&self) -> AuctionType {
        self.auction_type
    }

    /// Submit a bid; rejected once the auction has resolved
    ///
    /// `content` carries bid details beyond the amount (e.g. a promised SLA)
    /// and is currently informational.
    pub fn submit_bid(&self, agent_id: &str, amount: f64, _content: Option<Value>) -> bool {
        let mut state = self.state.lock();
        if !state.active {
            return false;
        }
        state.bids.insert(agent_id.to_string(), amount);
        true
    }

    /// Determine the winner and close the auction
    ///
    /// Highest amount wins; equal amounts tie-break on the lexicographically
    /// smaller agent id so resolution is deterministic. Returns `None` when
    /// no bids were placed.
    pub fn resolve(&self) -> Option<String> {
        let mut state = self.state.lock();
        let winner = state
            .bids
            .iter()
            .max_by(|(a_id, a_amt), (b_id, b_amt)| {
                a_amt
                    .partial_cmp(b_amt)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b_id.cmp(a_id))
            })
            .map(|(id, _)| id.clone());
        if winner.is_some() {
            state.active = false;
        }
        winner
    }
}

impl Default for BiddingProtocol {
    fn default() -> Self {
        Self::new(AuctionType::FirstPriceSealedBid)
    }
}
