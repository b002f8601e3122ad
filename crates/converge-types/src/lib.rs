//! Converge Types - Canonical domain types for the agent coordination runtime
//!
//! This crate contains the foundational types for Converge with zero
//! dependencies on other converge crates:
//!
//! - Routing topics (namespace + attributes + version)
//! - Agent capabilities and capability sets
//! - Tasks and the task lifecycle state machine
//! - The shared error taxonomy
//!
//! # Architectural Invariants
//!
//! 1. Fingerprints are the only agent identifier that crosses crate
//!    boundaries (hex SHA-256 of an Ed25519 public key)
//! 2. Tasks are mutated through a `TaskManager` only; the types here are
//!    plain data
//! 3. Terminal task states (COMPLETED, FAILED, CANCELLED) never transition
//!    again

pub mod capability;
pub mod error;
pub mod task;
pub mod topic;

pub use capability::*;
pub use error::*;
pub use task::*;
pub use topic::*;

/// Version of the Converge types schema
pub const TYPES_VERSION: &str = "0.1.0";
