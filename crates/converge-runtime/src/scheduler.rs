//! Wake/wait primitive for the agent loop
//!
//! A one-shot latch: `notify` sets it, `wait_for_work` consumes it.
//! Multiple notifies before a wait collapse into one wake. Any task may
//! notify; only the loop waits.

use std::time::Duration;

use tokio::sync::Notify;

/// Event-driven scheduler for the agent runtime
#[derive(Default)]
pub struct Scheduler {
    // Notify stores a single permit when no waiter is parked, which is
    // exactly the collapse-to-one latch semantics the loop needs.
    wake: Notify,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that new work is available, waking the loop if it waits
    pub fn notify(&self) {
        self.wake.notify_one();
    }

    /// Wait until notified or the timeout elapses
    ///
    /// Returns true when woken by a notify, false on timeout. The latch is
    /// cleared by a successful wait.
    pub async fn wait_for_work(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wake.notified())
            .await
            .is_ok()
    }
}
