//! Bounded diagnostic log of notable actions, persisted under `appEvents`

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::kv::{KeyValueStore, KeyValueStoreExt, StorageKey};

/// Oldest entries are evicted past this many
pub const MAX_EVENTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl EventLogEntry {
    pub fn new(event: impl Into<String>, attributes: Value) -> Self {
        let mut attributes = match attributes {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        // Reserved keys belong to the entry itself
        attributes.remove("event");
        attributes.remove("timestamp");
        Self {
            event: event.into(),
            timestamp: Utc::now(),
            attributes,
        }
    }
}

pub struct EventLog {
    kv: Arc<dyn KeyValueStore>,
    entries: Mutex<VecDeque<EventLogEntry>>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl EventLog {
    /// Load the persisted log. An unreadable log starts empty.
    pub fn open(kv: Arc<dyn KeyValueStore>) -> Self {
        let mut entries: VecDeque<EventLogEntry> =
            match kv.get_json::<Vec<EventLogEntry>>(StorageKey::AppEvents) {
                Ok(Some(stored)) => stored.into(),
                Ok(None) => VecDeque::new(),
                Err(e) => {
                    tracing::warn!("Starting a fresh event log, stored one is unreadable: {}", e);
                    VecDeque::new()
                }
            };
        while entries.len() > MAX_EVENTS {
            entries.pop_front();
        }
        Self {
            kv,
            entries: Mutex::new(entries),
        }
    }

    /// Append an entry. Never fails; persistence problems are only logged.
    pub fn record(&self, event: &str, attributes: Value) {
        let entry = EventLogEntry::new(event, attributes);
        tracing::debug!("Event {}: {:?}", entry.event, entry.attributes);

        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > MAX_EVENTS {
            entries.pop_front();
        }

        if let Err(e) = self.kv.set_json(StorageKey::AppEvents, &*entries) {
            tracing::error!("Event logging error: {}", e);
        }
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<EventLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// The newest `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<EventLogEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        if let Err(e) = self.kv.remove(StorageKey::AppEvents) {
            tracing::error!("Could not clear event log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_log_is_capped_fifo() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let log = EventLog::open(kv.clone());
        for i in 0..105 {
            log.record("tick", json!({ "seq": i }));
        }

        let entries = log.entries();
        assert_eq!(entries.len(), MAX_EVENTS);
        let seqs: Vec<i64> = entries
            .iter()
            .map(|e| e.attributes["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, (5..105).collect::<Vec<i64>>());

        // Reopening sees the same capped log
        let reopened = EventLog::open(kv);
        assert_eq!(reopened.len(), MAX_EVENTS);
        assert_eq!(reopened.entries()[0].attributes["seq"], 5);
    }

    #[test]
    fn test_entry_shape_is_flat() {
        let entry = EventLogEntry::new(
            "sos_alert_sent",
            json!({ "alert_id": "a1", "event": "spoofed" }),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["event"], "sos_alert_sent");
        assert_eq!(value["alert_id"], "a1");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_record_survives_storage_failure() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::with_quota(10));
        let log = EventLog::open(kv);
        log.record("report_sent", json!({ "report_type": "family" }));
        assert_eq!(log.len(), 1);
        assert_eq!(log.recent(5)[0].event, "report_sent");
    }
}
