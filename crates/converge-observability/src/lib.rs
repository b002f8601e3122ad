//! Converge Observability - Counters, trace spans, and the replay log
//!
//! Everything here is embeddable: the metrics collector renders Prometheus
//! text for whatever HTTP surface the operator runs, trace spans report to a
//! pluggable exporter on end, and the replay log exports JSON for offline
//! analysis.

pub mod metrics;
pub mod replay;
pub mod trace;

pub use metrics::*;
pub use replay::*;
pub use trace::*;
