//! Operational metrics

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

/// Counter incremented for every message pushed to an inbox
pub const MESSAGES_RECEIVED: &str = "messages_received";
/// Counter incremented for every message sent by the executor
pub const MESSAGES_SENT: &str = "messages_sent";
/// Counter incremented per decision dispatched
pub const DECISIONS_EXECUTED: &str = "decisions_executed";
/// Counter incremented per tool invocation
pub const TOOLS_INVOKED: &str = "tools_invoked";

/// A point-in-time copy of all metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
}

#[derive(Default)]
struct MetricsState {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, f64>,
}

/// Collects and aggregates operational metrics
#[derive(Default)]
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one
    pub fn inc(&self, metric_name: &str) {
        self.inc_by(metric_name, 1);
    }

    /// Increment a counter
    pub fn inc_by(&self, metric_name: &str, value: u64) {
        let mut state = self.state.lock();
        *state.counters.entry(metric_name.to_string()).or_insert(0) += value;
    }

    /// Set a gauge value
    pub fn gauge(&self, metric_name: &str, value: f64) {
        self.state
            .lock()
            .gauges
            .insert(metric_name.to_string(), value);
    }

    /// Current value of a counter (zero when never incremented)
    pub fn counter(&self, metric_name: &str) -> u64 {
        self.state
            .lock()
            .counters
            .get(metric_name)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        MetricsSnapshot {
            counters: state.counters.clone(),
            gauges: state.gauges.clone(),
        }
    }

    /// Metrics in Prometheus text exposition format
    ///
    /// Expose this from an HTTP handler in embedder code (e.g. `/metrics`).
    pub fn format_prometheus(&self) -> String {
        let state = self.state.lock();
        let mut lines = Vec::new();
        for (name, value) in &state.counters {
            let safe = sanitize(name);
            lines.push(format!("# TYPE {safe} counter"));
            lines.push(format!("{safe} {value}"));
        }
        for (name, value) in &state.gauges {
            let safe = sanitize(name);
            lines.push(format!("# TYPE {safe} gauge"));
            lines.push(format!("{safe} {value}"));
        }
        if lines.is_empty() {
            String::new()
        } else {
            lines.join("\n") + "\n"
        }
    }
}

fn sanitize(name: &str) -> String {
    name.replace(['.', '-'], "_")
}
