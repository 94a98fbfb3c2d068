//! Session-scoped performance tracing: any execution context may open a
//! tracker for the same session; records converge in a shared sqlite store
//! by read-union-recompute upserts. Tracing must never break a load, so every
//! public tracker operation swallows its own failures.

use crate::constants;
use crate::perf::{ChannelIndex, PerfRecord, PerfSession, now_ms};
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS performance_sessions (
    session_id TEXT PRIMARY KEY,
    session_start_ms INTEGER NOT NULL,
    session_end_ms INTEGER NOT NULL,
    records TEXT NOT NULL,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_start ON performance_sessions(session_start_ms);
";

/// Durable store of session envelopes, safe for concurrent opens from
/// multiple execution contexts
pub struct PerfDb {
    path: PathBuf,
}

impl PerfDb {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating cache dir {}", dir.display()))?;
        let db = Self {
            path: dir.join(constants::PERF_DB_FILE),
        };
        db.connect()?;
        Ok(db)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(conn)
    }

    /// Union `incoming` into the stored session (creating it if absent) and
    /// recompute the envelope bounds. The read-modify-write runs in an
    /// immediate transaction so concurrent writers serialize instead of
    /// clobbering each other.
    pub fn upsert(
        &self,
        session_id: &str,
        incoming: Vec<PerfRecord>,
        metadata: Option<serde_json::Value>,
    ) -> Result<PerfSession> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT records, metadata FROM performance_sessions WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let mut session = match existing {
            Some((records_json, stored_metadata)) => {
                let mut session = PerfSession::new(session_id);
                session.records = sonic_rs::from_str(&records_json)
                    .context("decoding stored session records")?;
                session.metadata = stored_metadata
                    .as_deref()
                    .and_then(|m| serde_json::from_str(m).ok());
                session
            }
            None => PerfSession::new(session_id),
        };

        session.merge(incoming);
        if metadata.is_some() {
            session.metadata = metadata;
        }

        tx.execute(
            "INSERT INTO performance_sessions
                (session_id, session_start_ms, session_end_ms, records, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id) DO UPDATE SET
                session_start_ms = excluded.session_start_ms,
                session_end_ms = excluded.session_end_ms,
                records = excluded.records,
                metadata = excluded.metadata",
            params![
                session_id,
                session.session_start_ms,
                session.session_end_ms,
                sonic_rs::to_string(&session.records)?,
                session
                    .metadata
                    .as_ref()
                    .map(|m| m.to_string())
            ],
        )?;
        tx.commit()?;
        Ok(session)
    }

    pub fn load(&self, session_id: &str) -> Result<Option<PerfSession>> {
        let conn = self.connect()?;
        let row: Option<(i64, i64, String, Option<String>)> = conn
            .query_row(
                "SELECT session_start_ms, session_end_ms, records, metadata
                 FROM performance_sessions WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((start, end, records_json, metadata)) = row else {
            return Ok(None);
        };

        Ok(Some(PerfSession {
            session_id: session_id.to_string(),
            session_start_ms: start,
            session_end_ms: end,
            records: sonic_rs::from_str(&records_json).context("decoding session records")?,
            metadata: metadata.as_deref().and_then(|m| serde_json::from_str(m).ok()),
        }))
    }

    /// `(session_id, start, end)` triples ordered newest first
    pub fn sessions(&self) -> Result<Vec<(String, i64, i64)>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, session_start_ms, session_end_ms
             FROM performance_sessions ORDER BY session_start_ms DESC",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

struct OpenEvent {
    start_ms: i64,
    channel_group: String,
    channel_index: ChannelIndex,
    msg: String,
}

/// Multi-writer trace handle. Records buffer locally and land in the shared
/// store on `flush`/`complete`.
pub struct PerformanceTracker {
    session_id: String,
    cache_dir: PathBuf,
    pending: Mutex<Vec<PerfRecord>>,
    open: Mutex<HashMap<u64, OpenEvent>>,
    next_event: AtomicU64,
}

impl PerformanceTracker {
    /// Start a fresh session
    pub fn new(cache_dir: &Path) -> Self {
        Self::for_session(cache_dir, uuid::Uuid::new_v4().to_string())
    }

    /// Join an existing session from another execution context
    pub fn for_session(cache_dir: &Path, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cache_dir: cache_dir.to_path_buf(),
            pending: Mutex::new(Vec::new()),
            open: Mutex::new(HashMap::new()),
            next_event: AtomicU64::new(1),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Open a span; pair with `end_event` using the returned id
    pub fn start_event(
        &self,
        channel_group: impl Into<String>,
        channel_index: impl Into<ChannelIndex>,
        msg: impl Into<String>,
    ) -> u64 {
        let event_id = self.next_event.fetch_add(1, Ordering::Relaxed);
        self.open.lock().unwrap().insert(
            event_id,
            OpenEvent {
                start_ms: now_ms(),
                channel_group: channel_group.into(),
                channel_index: channel_index.into(),
                msg: msg.into(),
            },
        );
        event_id
    }

    /// Close a span; unknown ids are ignored
    pub fn end_event(&self, event_id: u64) {
        let Some(open) = self.open.lock().unwrap().remove(&event_id) else {
            return;
        };
        self.pending.lock().unwrap().push(PerfRecord {
            start_ms: open.start_ms,
            end_ms: now_ms(),
            channel_group: open.channel_group,
            channel_index: open.channel_index,
            msg: open.msg,
        });
    }

    /// Emit a complete record; omitted times default to now
    pub fn record_event(
        &self,
        channel_group: impl Into<String>,
        channel_index: impl Into<ChannelIndex>,
        msg: impl Into<String>,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) {
        let now = now_ms();
        self.pending.lock().unwrap().push(PerfRecord {
            start_ms: start_ms.unwrap_or(now),
            end_ms: end_ms.unwrap_or(now),
            channel_group: channel_group.into(),
            channel_index: channel_index.into(),
            msg: msg.into(),
        });
    }

    fn try_flush(&self, metadata: Option<serde_json::Value>) -> Result<()> {
        let drained: Vec<PerfRecord> = std::mem::take(&mut *self.pending.lock().unwrap());
        if drained.is_empty() && metadata.is_none() {
            return Ok(());
        }
        let db = PerfDb::open(&self.cache_dir)?;
        db.upsert(&self.session_id, drained, metadata)?;
        Ok(())
    }

    /// Push buffered records to the store
    pub fn flush(&self) {
        if let Err(e) = self.try_flush(None) {
            log::warn!("[Tracker] flush failed for session {}: {:#}", self.session_id, e);
        }
    }

    /// Flush everything and persist the final envelope
    pub fn complete(&self, metadata: Option<serde_json::Value>) {
        // close any spans left open so their time is not lost
        let leftover: Vec<u64> = self.open.lock().unwrap().keys().copied().collect();
        for event_id in leftover {
            self.end_event(event_id);
        }
        if let Err(e) = self.try_flush(metadata.or_else(|| Some(serde_json::json!({})))) {
            log::warn!(
                "[Tracker] complete failed for session {}: {:#}",
                self.session_id,
                e
            );
        }
    }

    /// Union server-pulled records into the stored session
    pub fn merge_server_records(&self, records: Vec<PerfRecord>) {
        if records.is_empty() {
            return;
        }
        let result = PerfDb::open(&self.cache_dir).and_then(|db| db.upsert(&self.session_id, records, None));
        if let Err(e) = result {
            log::warn!("[Tracker] server merge failed for session {}: {:#}", self.session_id, e);
        }
    }
}
