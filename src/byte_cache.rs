//! Persistent chunk byte cache keyed by (file, chunk size, chunk index),
//! with bulk delete by file and time-based eviction

use crate::constants;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

/// One cached chunk payload with its precomputed extrema
#[derive(Debug, Clone, PartialEq)]
pub struct CachedChunk {
    pub bytes: Vec<u8>,
    pub min: f64,
    pub max: f64,
    pub timestamp_ms: i64,
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    key TEXT PRIMARY KEY,
    file TEXT NOT NULL,
    chunk_size INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL,
    buffer BLOB NOT NULL,
    min REAL NOT NULL,
    max REAL NOT NULL,
    timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file);
CREATE INDEX IF NOT EXISTS idx_chunks_timestamp ON chunks(timestamp);
";

/// Persistent key-value store for chunk bytes. Each operation opens its own
/// connection so loads and idle writebacks may run from any task
/// concurrently; sqlite serializes the writers.
pub struct LocalByteCache {
    path: PathBuf,
}

impl LocalByteCache {
    /// Open (and migrate if needed) the cache database under `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating cache dir {}", dir.display()))?;
        let cache = Self {
            path: dir.join(constants::BYTE_CACHE_FILE),
        };
        cache.connect()?;
        Ok(cache)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < constants::BYTE_CACHE_SCHEMA_VERSION {
            // pre-v2 layouts lacked the secondary indexes; rebuild from scratch
            conn.execute_batch("DROP TABLE IF EXISTS chunks;")?;
            conn.execute_batch(SCHEMA_SQL)?;
            conn.pragma_update(None, "user_version", constants::BYTE_CACHE_SCHEMA_VERSION)?;
        } else {
            conn.execute_batch(SCHEMA_SQL)?;
        }
        Ok(conn)
    }

    fn key(file: &str, chunk_size: u64, chunk_index: u32) -> String {
        format!("{}_{}_{}", file, chunk_size, chunk_index)
    }

    pub fn get(&self, file: &str, chunk_size: u64, chunk_index: u32) -> Result<Option<CachedChunk>> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT buffer, min, max, timestamp FROM chunks WHERE key = ?1",
            params![Self::key(file, chunk_size, chunk_index)],
            |row| {
                Ok(CachedChunk {
                    bytes: row.get(0)?,
                    min: row.get(1)?,
                    max: row.get(2)?,
                    timestamp_ms: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(anyhow::Error::from)
    }

    /// Idempotent write; an identical key overwrites
    pub fn put(
        &self,
        file: &str,
        chunk_size: u64,
        chunk_index: u32,
        bytes: &[u8],
        min: f64,
        max: f64,
        timestamp_ms: i64,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO chunks (key, file, chunk_size, chunk_index, buffer, min, max, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(key) DO UPDATE SET
                buffer = excluded.buffer,
                min = excluded.min,
                max = excluded.max,
                timestamp = excluded.timestamp",
            params![
                Self::key(file, chunk_size, chunk_index),
                file,
                chunk_size,
                chunk_index,
                bytes,
                min,
                max,
                timestamp_ms
            ],
        )?;
        Ok(())
    }

    /// Drop one cached chunk
    pub fn remove(&self, file: &str, chunk_size: u64, chunk_index: u32) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM chunks WHERE key = ?1",
            params![Self::key(file, chunk_size, chunk_index)],
        )?;
        Ok(())
    }

    /// Bulk erase every chunk of a file, via the secondary index
    pub fn delete_by_file(&self, file: &str) -> Result<usize> {
        let conn = self.connect()?;
        let deleted = conn.execute("DELETE FROM chunks WHERE file = ?1", params![file])?;
        Ok(deleted)
    }

    /// Erase chunks older than `max_age_ms`, via the timestamp index
    pub fn evict(&self, max_age_ms: i64, now_ms: i64) -> Result<usize> {
        let conn = self.connect()?;
        let deleted = conn.execute(
            "DELETE FROM chunks WHERE timestamp < ?1",
            params![now_ms - max_age_ms],
        )?;
        Ok(deleted)
    }

    pub fn clear_all(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM chunks", [])?;
        Ok(())
    }

    /// (entries, total payload bytes) for the maintenance CLI
    pub fn stats(&self) -> Result<(u64, u64)> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(buffer)), 0) FROM chunks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(anyhow::Error::from)
    }
}
