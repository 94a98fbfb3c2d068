//! Process-local layout cache: synchronous (file, chunk size) -> chunk layout
//! lookups that never touch the network

use crate::constants;
use crate::field::{ChunkDescriptor, Shape};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Layout captured from a preprocess response. `file_size` doubles as a
/// cheap staleness fingerprint: a later preprocess whose size differs
/// replaces the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRecord {
    pub shape: Shape,
    pub chunks: Vec<ChunkDescriptor>,
    pub data_length: u64,
    #[serde(default)]
    pub file_size: u64,
}

/// String-keyed map persisted as one JSON file. Reads are O(1) against the
/// in-memory copy; writes rewrite the file synchronously.
pub struct LayoutCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl LayoutCache {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating cache dir {}", dir.display()))?;
        let path = dir.join(constants::LAYOUT_CACHE_FILE);

        let entries = if path.is_file() {
            let data = std::fs::read_to_string(&path)?;
            sonic_rs::from_str(&data).unwrap_or_else(|e| {
                log::warn!("[LayoutCache] discarding unreadable cache file: {}", e);
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn key(file: &str, chunk_size: u64) -> String {
        format!("{}_{}_{}", constants::LAYOUT_KEY_PREFIX, file, chunk_size)
    }

    pub fn get(&self, file: &str, chunk_size: u64) -> Option<LayoutRecord> {
        let entries = self.entries.lock().unwrap();
        let raw = entries.get(&Self::key(file, chunk_size))?;
        match sonic_rs::from_str(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("[LayoutCache] undecodable record for {}: {}", file, e);
                None
            }
        }
    }

    pub fn put(&self, file: &str, chunk_size: u64, record: &LayoutRecord) -> Result<()> {
        let encoded = sonic_rs::to_string(record)?;
        let snapshot = {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(Self::key(file, chunk_size), encoded);
            sonic_rs::to_string(&*entries)?
        };
        std::fs::write(&self.path, snapshot)
            .with_context(|| format!("writing {}", self.path.display()))
    }

    pub fn remove(&self, file: &str, chunk_size: u64) -> Result<()> {
        let snapshot = {
            let mut entries = self.entries.lock().unwrap();
            entries.remove(&Self::key(file, chunk_size));
            sonic_rs::to_string(&*entries)?
        };
        std::fs::write(&self.path, snapshot)
            .with_context(|| format!("writing {}", self.path.display()))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
