//! Inbound message buffer
//!
//! The listener pushes, the loop drains. An unbounded inbox never blocks; a
//! bounded one either waits for space or, with `drop_when_full`, discards.
//! `poll` never blocks.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use converge_core::Message;

enum Queue {
    Unbounded {
        tx: mpsc::UnboundedSender<Message>,
        rx: Mutex<mpsc::UnboundedReceiver<Message>>,
    },
    Bounded {
        tx: mpsc::Sender<Message>,
        rx: Mutex<mpsc::Receiver<Message>>,
        drop_when_full: bool,
    },
}

/// Buffers incoming messages for the agent loop
pub struct Inbox {
    queue: Queue,
}

/// Default batch size for [`Inbox::poll`]
pub const DEFAULT_POLL_BATCH: usize = 10;

impl Inbox {
    /// Unbounded inbox
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            queue: Queue::Unbounded {
                tx,
                rx: Mutex::new(rx),
            },
        }
    }

    /// Bounded inbox; when full, `push` waits unless `drop_when_full`
    pub fn bounded(maxsize: usize, drop_when_full: bool) -> Self {
        let (tx, rx) = mpsc::channel(maxsize.max(1));
        Self {
            queue: Queue::Bounded {
                tx,
                rx: Mutex::new(rx),
                drop_when_full,
            },
        }
    }

    /// Enqueue a message
    pub async fn push(&self, message: Message) {
        match &self.queue {
            Queue::Unbounded { tx, .. } => {
                let _ = tx.send(message);
            }
            Queue::Bounded {
                tx, drop_when_full, ..
            } => {
                if *drop_when_full {
                    let _ = tx.try_send(message);
                } else {
                    let _ = tx.send(message).await;
                }
            }
        }
    }

    /// Drain up to `batch_size` messages without blocking
    pub fn poll(&self, batch_size: usize) -> Vec<Message> {
        let mut messages = Vec::new();
        match &self.queue {
            Queue::Unbounded { rx, .. } => {
                let mut rx = rx.lock();
                while messages.len() < batch_size {
                    match rx.try_recv() {
                        Ok(message) => messages.push(message),
                        Err(_) => break,
                    }
                }
            }
            Queue::Bounded { rx, .. } => {
                let mut rx = rx.lock();
                while messages.len() < batch_size {
                    match rx.try_recv() {
                        Ok(message) => messages.push(message),
                        Err(_) => break,
                    }
                }
            }
        }
        messages
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_drains_up_to_batch() {
        let inbox = Inbox::new();
        for i in 0..15 {
            inbox.push(Message::with_content(format!("m{i}"))).await;
        }
        assert_eq!(inbox.poll(DEFAULT_POLL_BATCH).len(), 10);
        assert_eq!(inbox.poll(DEFAULT_POLL_BATCH).len(), 5);
        assert!(inbox.poll(DEFAULT_POLL_BATCH).is_empty());
    }

    #[tokio::test]
    async fn test_bounded_drop_when_full_discards() {
        let inbox = Inbox::bounded(2, true);
        inbox.push(Message::with_content("a")).await;
        inbox.push(Message::with_content("b")).await;
        // Full: this one is dropped rather than blocking the listener.
        inbox.push(Message::with_content("c")).await;
        assert_eq!(inbox.poll(10).len(), 2);
    }

    #[tokio::test]
    async fn test_bounded_blocks_until_space() {
        let inbox = std::sync::Arc::new(Inbox::bounded(1, false));
        inbox.push(Message::with_content("first")).await;

        let pusher = std::sync::Arc::clone(&inbox);
        let handle = tokio::spawn(async move {
            pusher.push(Message::with_content("second")).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        assert_eq!(inbox.poll(1).len(), 1);
        handle.await.unwrap();
        assert_eq!(inbox.poll(1).len(), 1);
    }
}
