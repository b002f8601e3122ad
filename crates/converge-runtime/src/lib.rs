//! Converge Runtime - The agent loop and decision executor
//!
//! Data flows transport → inbox → loop → `Agent::decide` → decisions →
//! executor → managers and transport. Control is wake-driven: transport
//! receipt notifies the scheduler; the loop wakes, drains, decides, and
//! dispatches.
//!
//! Everything an agent does is serialized on its own loop task; transports
//! may run receiver tasks, but those only enqueue and never call agent code.

pub mod executor;
pub mod inbox;
pub mod runtime;
pub mod scheduler;

pub use executor::*;
pub use inbox::*;
pub use runtime::*;
pub use scheduler::*;
