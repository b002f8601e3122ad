//! Converge Policy - Admission, trust, and safety policies
//!
//! Policies gate two chokepoints:
//!
//! - Pool admission: `AdmissionPolicy` and `TrustModel` evaluated on join
//! - Executor safety: `ActionPolicy` allowlists and `ResourceLimits` bounds
//!   checked before a decision is dispatched

pub mod admission;
pub mod safety;
pub mod trust;

pub use admission::*;
pub use safety::*;
pub use trust::*;
