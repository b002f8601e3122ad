//! Process-local monotonic clock
//!
//! Claim leases compare readings of this clock. Readings are meaningless
//! across processes; the task manager re-stamps leases it loads from the
//! store instead of trusting a foreign epoch.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds elapsed on the process-local monotonic clock
pub fn monotonic_now() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}
