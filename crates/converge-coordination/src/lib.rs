//! Converge Coordination - Task lifecycle, pool membership, and protocols
//!
//! Two managers own all mutable coordination state:
//!
//! - `TaskManager`: the task state machine, exclusive claims with lease
//!   expiry, persistence on every transition
//! - `PoolManager`: pool creation and gated membership, mirrored to the
//!   store on every mutation
//!
//! The remaining modules are decision sinks the executor dispatches into:
//! auctions, votes, negotiation sessions, delegation mandates, and pool
//! governance.

pub mod bidding;
pub mod clock;
pub mod consensus;
pub mod delegation;
pub mod governance;
pub mod negotiation;
pub mod pool_manager;
pub mod task_manager;

pub use bidding::*;
pub use clock::*;
pub use consensus::*;
pub use delegation::*;
pub use governance::*;
pub use negotiation::*;
pub use pool_manager::*;
pub use task_manager::*;
