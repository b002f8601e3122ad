//! Replay log
//!
//! Records message traffic for audit and offline replay. Events serialize
//! to a JSON array; loading replaces the in-memory log.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use converge_core::Message;
use converge_types::{ConvergeError, Result};

/// A recorded event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayEvent {
    /// Event kind (currently always `"message"`)
    #[serde(rename = "type")]
    pub kind: String,
    /// The message's own timestamp
    pub timestamp: i64,
    /// Event body
    pub data: Value,
}

/// Records messages for debugging and analysis
#[derive(Default)]
pub struct ReplayLog {
    events: Mutex<Vec<ReplayEvent>>,
}

impl ReplayLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message dispatch or receipt
    pub fn record_message(&self, message: &Message) {
        let data = serde_json::to_value(message).unwrap_or(Value::Null);
        self.events.lock().push(ReplayEvent {
            kind: "message".to_string(),
            timestamp: message.timestamp,
            data,
        });
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Copy of all recorded events
    pub fn events(&self) -> Vec<ReplayEvent> {
        self.events.lock().clone()
    }

    /// Export the log as a JSON array
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), &*self.events.lock())
            .map_err(|e| ConvergeError::serialization(e.to_string()))
    }

    /// Load a log from a JSON array, replacing the current events
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path)?;
        let events: Vec<ReplayEvent> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ConvergeError::serialization(e.to_string()))?;
        *self.events.lock() = events;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_export_load() {
        let log = ReplayLog::new();
        assert!(log.is_empty());

        let msg = Message::with_content("hello").from_sender("a");
        log.record_message(&msg);
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0].timestamp, msg.timestamp);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        log.export(&path).unwrap();

        let restored = ReplayLog::new();
        restored.load(&path).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.events()[0].kind, "message");
    }
}
