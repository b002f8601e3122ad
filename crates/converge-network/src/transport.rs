//! The transport contract
//!
//! Transports move messages; they do not interpret them. `send` before
//! `start` is a not-started error, `receive` past its deadline is a timeout
//! error, and `receive_verified` turns verification failures into silent
//! drops (`None`) so callers can treat them uniformly.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use converge_core::Message;
use converge_types::Result;

use crate::IdentityRegistry;

/// A pluggable message transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the transport
    async fn start(&self) -> Result<()>;

    /// Stop the transport and release its resources
    async fn stop(&self) -> Result<()>;

    /// Send a message
    async fn send(&self, message: &Message) -> Result<()>;

    /// Receive the next inbound message, waiting up to `timeout` when set
    async fn receive(&self, timeout: Option<Duration>) -> Result<Message>;

    /// Receive and verify the next message
    ///
    /// Returns `None` when the sender is unknown to the registry or the
    /// signature does not verify; the caller drops such messages.
    async fn receive_verified(
        &self,
        registry: &IdentityRegistry,
        timeout: Option<Duration>,
    ) -> Result<Option<Message>> {
        let message = self.receive(timeout).await?;
        match registry.get(&message.sender) {
            Some(public_key) if message.verify(&public_key) => Ok(Some(message)),
            Some(_) => {
                debug!(sender = %message.sender, id = %message.id, "dropping message with bad signature");
                Ok(None)
            }
            None => {
                debug!(sender = %message.sender, id = %message.id, "dropping message from unknown sender");
                Ok(None)
            }
        }
    }
}
