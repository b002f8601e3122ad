//! Converge Network - Transports, identity registry, and discovery
//!
//! Three transports implement the same contract:
//!
//! - In-process: a registry of queues with topic-namespace routing
//! - TCP: length-prefixed frames with per-peer pooled writers, optional TLS
//! - WebSocket: the same frames carried inside WS binary messages
//!
//! `receive_verified` pairs any transport with an `IdentityRegistry` to drop
//! messages from unknown senders or with bad signatures before they reach
//! the agent loop.

pub mod discovery;
pub mod identity_registry;
pub mod local;
pub mod tcp;
pub mod transport;
pub mod websocket;

pub use discovery::*;
pub use identity_registry::*;
pub use local::*;
pub use tcp::*;
pub use transport::*;
pub use websocket::*;
