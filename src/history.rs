//! Request history tracking for debugging and diagnostics.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type of message in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Send,
    Receive,
    Error,
}

/// A recorded message in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub msg_type: MessageType,
    /// Request line, e.g. `PUT /lights/1/state`
    pub method: String,
    pub message: Value,
    /// Seconds since history creation
    pub timestamp: f64,
}

/// Tracks the requests exchanged with a bridge.
#[derive(Debug, Clone)]
pub struct MessageHistory {
    latest: HashMap<MessageType, HashMap<String, Value>>,
    last_error: Option<String>,
    start_time: Instant,
    entries: Vec<HistoryEntry>,
    max_entries: usize,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self {
            latest: HashMap::from([
                (MessageType::Send, HashMap::new()),
                (MessageType::Receive, HashMap::new()),
                (MessageType::Error, HashMap::new()),
            ]),
            last_error: None,
            start_time: Instant::now(),
            entries: Vec::new(),
            max_entries: Self::DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Self::new()
        }
    }

    pub fn record(&mut self, msg_type: MessageType, method: &str, message: &Value) {
        if let Some(type_map) = self.latest.get_mut(&msg_type) {
            type_map.insert(method.to_string(), message.clone());
        }

        self.entries.push(HistoryEntry {
            msg_type,
            method: method.to_string(),
            message: message.clone(),
            timestamp: self.start_time.elapsed().as_secs_f64(),
        });

        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
    }

    pub fn record_error(&mut self, method: &str, error: &str) {
        self.record(MessageType::Error, method, &Value::String(error.to_string()));
        self.last_error = Some(error.to_string());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The most recent message of `msg_type` for a request line.
    pub fn latest(&self, msg_type: MessageType, method: &str) -> Option<&Value> {
        self.latest.get(&msg_type).and_then(|m| m.get(method))
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.latest.values_mut().for_each(|m| m.clear());
        self.entries.clear();
        self.last_error = None;
    }

    pub fn summary(&self) -> HistorySummary {
        let count = |t: MessageType| self.entries.iter().filter(|e| e.msg_type == t).count();
        HistorySummary {
            send_count: count(MessageType::Send),
            receive_count: count(MessageType::Receive),
            error_count: count(MessageType::Error),
            total_entries: self.entries.len(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Summary of request history for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub send_count: usize,
    pub receive_count: usize,
    pub error_count: usize,
    pub total_entries: usize,
    pub last_error: Option<String>,
}
