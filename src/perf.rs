//! Trace data model shared by the client tracker, the server store and the wire

use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds since the Unix epoch. All trace timestamps use
/// this clock so records from different threads and from the server align on
/// one timeline.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Channel identifier within a group; the original emitters use both lane
/// numbers and symbolic names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelIndex {
    Index(u32),
    Name(String),
}

impl From<u32> for ChannelIndex {
    fn from(v: u32) -> Self {
        Self::Index(v)
    }
}

impl From<&str> for ChannelIndex {
    fn from(v: &str) -> Self {
        Self::Name(v.to_string())
    }
}

impl std::fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{}", i),
            Self::Name(s) => write!(f, "{}", s),
        }
    }
}

/// One timed span. Wire names are `start_time`/`end_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfRecord {
    #[serde(rename = "start_time")]
    pub start_ms: i64,
    #[serde(rename = "end_time")]
    pub end_ms: i64,
    pub channel_group: String,
    pub channel_index: ChannelIndex,
    pub msg: String,
}

/// A session's persisted envelope: the record set plus its recomputed time
/// bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfSession {
    pub session_id: String,
    pub session_start_ms: i64,
    pub session_end_ms: i64,
    pub records: Vec<PerfRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PerfSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            session_start_ms: 0,
            session_end_ms: 0,
            records: Vec::new(),
            metadata: None,
        }
    }

    /// Union `incoming` into the record set (skipping exact duplicates) and
    /// recompute the envelope bounds. Readers rely on this rather than on any
    /// write ordering between trackers.
    pub fn merge(&mut self, incoming: Vec<PerfRecord>) {
        for rec in incoming {
            if !self.records.contains(&rec) {
                self.records.push(rec);
            }
        }
        self.recompute_bounds();
    }

    pub fn recompute_bounds(&mut self) {
        self.session_start_ms = self.records.iter().map(|r| r.start_ms).min().unwrap_or(0);
        self.session_end_ms = self.records.iter().map(|r| r.end_ms).max().unwrap_or(0);
    }
}
