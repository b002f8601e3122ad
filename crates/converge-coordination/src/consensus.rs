//! Basic consensus mechanisms
//!
//! Votes are arbitrary JSON values; tallying keys on the serialized form so
//! structurally equal votes count together.

use std::collections::HashMap;

use serde_json::Value;

fn tally(votes: &[Value]) -> Vec<(Value, usize)> {
    let mut counts: HashMap<String, (Value, usize)> = HashMap::new();
    for vote in votes {
        let key = vote.to_string();
        let entry = counts.entry(key).or_insert_with(|| (vote.clone(), 0));
        entry.1 += 1;
    }
    let mut out: Vec<(Value, usize)> = counts.into_values().collect();
    // Sort by count desc, then serialized form for a stable order.
    out.sort_by(|(a_val, a_n), (b_val, b_n)| {
        b_n.cmp(a_n).then_with(|| a_val.to_string().cmp(&b_val.to_string()))
    });
    out
}

/// Winner by strict majority (> 50%), or `None` without one
pub fn majority_vote(votes: &[Value]) -> Option<Value> {
    if votes.is_empty() {
        return None;
    }
    let (top, freq) = tally(votes).into_iter().next()?;
    if freq * 2 > votes.len() {
        Some(top)
    } else {
        None
    }
}

/// Winner by plurality, or `None` on a tie for first place
pub fn plurality_vote(votes: &[Value]) -> Option<Value> {
    if votes.is_empty() {
        return None;
    }
    let ranked = tally(votes);
    match ranked.as_slice() {
        [] => None,
        [(only, _)] => Some(only.clone()),
        [(best, best_n), (_, runner_n), ..] => {
            if best_n == runner_n {
                None
            } else {
                Some(best.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(options: &[&str]) -> Vec<Value> {
        options.iter().map(|o| Value::String(o.to_string())).collect()
    }

    #[test]
    fn test_majority() {
        assert_eq!(
            majority_vote(&votes(&["a", "a", "b"])),
            Some(Value::String("a".to_string()))
        );
        // 2 of 4 is not a strict majority.
        assert_eq!(majority_vote(&votes(&["a", "a", "b", "c"])), None);
        assert_eq!(majority_vote(&[]), None);
    }

    #[test]
    fn test_plurality() {
        assert_eq!(
            plurality_vote(&votes(&["a", "a", "b", "c"])),
            Some(Value::String("a".to_string()))
        );
        // Tie at the top returns None.
        assert_eq!(plurality_vote(&votes(&["a", "a", "b", "b", "c"])), None);
        assert_eq!(
            plurality_vote(&votes(&["solo"])),
            Some(Value::String("solo".to_string()))
        );
        assert_eq!(plurality_vote(&[]), None);
    }

    #[test]
    fn test_structural_equality_counts_together() {
        let votes = vec![
            serde_json::json!({"option": 1}),
            serde_json::json!({"option": 1}),
            serde_json::json!({"option": 2}),
        ];
        assert_eq!(majority_vote(&votes), Some(serde_json::json!({"option": 1})));
    }
}
