//! Server-side session trace log: append from any handler, drained by `GET /performance`

use crate::perf::PerfRecord;
use std::collections::HashMap;
use std::sync::RwLock;

/// Session-keyed append log of tracing records. Purely in-memory; sessions
/// are short-lived and clients merge the records into their own durable
/// store.
pub struct PerfStore {
    sessions: RwLock<HashMap<String, Vec<PerfRecord>>>,
}

impl PerfStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, session_id: &str, record: PerfRecord) {
        self.sessions
            .write()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .push(record);
    }

    /// Records appended for a session so far; empty for unknown sessions
    pub fn records(&self, session_id: &str) -> Vec<PerfRecord> {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.write().unwrap().remove(session_id);
    }

    pub fn clear(&self) {
        self.sessions.write().unwrap().clear();
    }
}

impl Default for PerfStore {
    fn default() -> Self {
        Self::new()
    }
}
