//! Load orchestrator: consults the layout and byte caches, falls back to
//! preprocess plus a lane fan-out, merges chunks in index order and schedules
//! idle-time cache writeback

use crate::byte_cache::LocalByteCache;
use crate::chunk_client::{ChunkClient, RetryPolicy};
use crate::constants;
use crate::error::LoadError;
use crate::field::{self, Shape};
use crate::lanes::{ChunkMessage, FetchRequest, LanePool, LaneSession};
use crate::layout_cache::{LayoutCache, LayoutRecord};
use crate::perf::now_ms;
use crate::preprocess::PreprocessResponse;
use crate::tracker::PerformanceTracker;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DataSourceConfig {
    pub base_url: String,
    pub cache_dir: PathBuf,
    /// Requested lane ceiling; clamped to `constants::MAX_LANES`
    pub max_lanes: usize,
    pub retry: RetryPolicy,
    /// Disable both local stores (every load goes to the network)
    pub use_cache: bool,
}

impl DataSourceConfig {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            cache_dir: cache_dir.into(),
            max_lanes: constants::MAX_LANES,
            retry: RetryPolicy::default(),
            use_cache: true,
        }
    }
}

/// Per-chunk provenance in a finished load, index order
#[derive(Debug, Clone, Copy)]
pub struct ChunkSummary {
    pub index: u32,
    pub len: u64,
    pub min: f64,
    pub max: f64,
    pub from_cache: bool,
}

/// A merged field ready for the mesher
#[derive(Debug)]
pub struct LoadResult {
    /// Contiguous x-fastest sample buffer, `data_length` elements
    pub values: Vec<f64>,
    pub shape: Shape,
    pub data_length: u64,
    /// Global extrema; `None` only for an empty field, which callers must
    /// treat as "no surface to request"
    pub min_max: Option<(f64, f64)>,
    /// Task that served the load, absent when every chunk came from cache
    pub task_id: Option<String>,
    pub fetch_ms: u64,
    pub all_from_cache: bool,
    pub chunks: Vec<ChunkSummary>,
}

struct ChunkData {
    index: u32,
    values: Vec<f64>,
    min: f64,
    max: f64,
    from_cache: bool,
}

pub struct DataSource {
    client: Arc<ChunkClient>,
    byte_cache: Option<Arc<LocalByteCache>>,
    layout_cache: Option<LayoutCache>,
    cache_dir: PathBuf,
    max_lanes: usize,
}

impl DataSource {
    /// Build a data source. Cache stores that fail to open degrade to a
    /// cacheless source rather than failing construction.
    pub fn new(config: DataSourceConfig) -> Result<Self> {
        let client = Arc::new(ChunkClient::new(config.base_url, config.retry)?);

        let (byte_cache, layout_cache) = if config.use_cache {
            let byte_cache = match LocalByteCache::open(&config.cache_dir) {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    log::warn!("[DataSource] byte cache unavailable: {:#}", e);
                    None
                }
            };
            let layout_cache = match LayoutCache::open(&config.cache_dir) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    log::warn!("[DataSource] layout cache unavailable: {:#}", e);
                    None
                }
            };
            (byte_cache, layout_cache)
        } else {
            (None, None)
        };

        Ok(Self {
            client,
            byte_cache,
            layout_cache,
            cache_dir: config.cache_dir,
            max_lanes: config.max_lanes.min(constants::MAX_LANES).max(1),
        })
    }

    /// Load a field: merged contiguous buffer plus global min/max, with both
    /// cache levels consulted before any network round-trip
    pub async fn load_data(
        &self,
        file: &str,
        chunk_size: u64,
        tracker: Option<&PerformanceTracker>,
    ) -> Result<LoadResult, LoadError> {
        let load_start = Instant::now();
        let load_event = tracker.map(|t| t.start_event("main", "load", format!("load {}", file)));

        let result = self.load_inner(file, chunk_size, tracker, load_start).await;

        if let (Some(tracker), Some(event)) = (tracker, load_event) {
            tracker.end_event(event);
            tracker.flush();
        }
        result
    }

    async fn load_inner(
        &self,
        file: &str,
        chunk_size: u64,
        tracker: Option<&PerformanceTracker>,
        load_start: Instant,
    ) -> Result<LoadResult, LoadError> {
        let session_id = tracker.map(|t| t.session_id().to_string());

        // both caches warm: no preprocess, no chunk requests
        if let Some(layout) = self.layout_get(file, chunk_size)
            && let Some(chunks) = self.all_cached(file, chunk_size, &layout)
        {
            log::debug!("[DataSource] {} served entirely from cache", file);
            return merge(chunks, layout.shape, layout.data_length, None, true, load_start);
        }

        let preprocess_event =
            tracker.map(|t| t.start_event("main", "preprocess", format!("preprocess {}", file)));
        let response = self
            .client
            .preprocess(file, chunk_size, session_id.as_deref())
            .await?;
        if let (Some(tracker), Some(event)) = (tracker, preprocess_event) {
            tracker.end_event(event);
        }

        self.layout_put(file, chunk_size, &response);

        if response.chunks.is_empty() {
            return Ok(LoadResult {
                values: Vec::new(),
                shape: response.shape,
                data_length: 0,
                min_max: None,
                task_id: Some(response.task_id),
                fetch_ms: load_start.elapsed().as_millis() as u64,
                all_from_cache: false,
                chunks: Vec::new(),
            });
        }

        // per-chunk probe: hits resolve immediately, misses go to the lanes
        let chunk_count = response.chunks.len();
        let mut slots: Vec<Option<ChunkData>> = (0..chunk_count).map(|_| None).collect();
        let mut misses: Vec<u32> = Vec::new();

        for descriptor in &response.chunks {
            match self.cache_get(file, chunk_size, descriptor.index) {
                Some((values, min, max)) => {
                    slots[descriptor.index as usize] = Some(ChunkData {
                        index: descriptor.index,
                        values,
                        min,
                        max,
                        from_cache: true,
                    });
                }
                None => misses.push(descriptor.index),
            }
        }

        if !misses.is_empty() {
            let lane_count = self.max_lanes.min(chunk_count);
            let session = session_id.as_ref().map(|session_id| LaneSession {
                cache_dir: self.cache_dir.clone(),
                session_id: session_id.clone(),
            });
            let mut pool = LanePool::spawn(Arc::clone(&self.client), lane_count, session);

            for (seq, &index) in misses.iter().enumerate() {
                pool.dispatch(
                    seq % lane_count,
                    FetchRequest {
                        task_id: response.task_id.clone(),
                        chunk_index: index,
                    },
                );
            }

            let mut outstanding = misses.len();
            while outstanding > 0 {
                match pool.next().await {
                    Some(ChunkMessage::Chunk {
                        chunk_index,
                        values,
                        min,
                        max,
                    }) => {
                        slots[chunk_index as usize] = Some(ChunkData {
                            index: chunk_index,
                            values,
                            min,
                            max,
                            from_cache: false,
                        });
                        outstanding -= 1;
                    }
                    Some(ChunkMessage::Error { chunk_index, error }) => {
                        // first error aborts the load and every other fetch
                        log::warn!("[DataSource] chunk {} failed: {}", chunk_index, error);
                        pool.terminate();
                        return Err(error);
                    }
                    None => {
                        return Err(LoadError::Transport(
                            "fetch lanes closed unexpectedly".to_string(),
                        ));
                    }
                }
            }
            pool.terminate();
        }

        let chunks: Vec<ChunkData> = slots.into_iter().flatten().collect();
        if chunks.len() != chunk_count {
            return Err(LoadError::Transport("missing chunk replies".to_string()));
        }

        self.schedule_writeback(file, chunk_size, &chunks);

        let merge_event = tracker.map(|t| t.start_event("main", "merge", "merge chunks"));
        let merged = merge(
            chunks,
            response.shape,
            response.data_length,
            Some(response.task_id),
            false,
            load_start,
        );
        if let (Some(tracker), Some(event)) = (tracker, merge_event) {
            tracker.end_event(event);
        }
        merged
    }

    // ------------------------------------------------------------------
    // cache helpers: every failure degrades, none aborts a load
    // ------------------------------------------------------------------

    fn layout_get(&self, file: &str, chunk_size: u64) -> Option<LayoutRecord> {
        self.layout_cache.as_ref()?.get(file, chunk_size)
    }

    fn layout_put(&self, file: &str, chunk_size: u64, response: &PreprocessResponse) {
        let Some(cache) = &self.layout_cache else {
            return;
        };
        let record = LayoutRecord {
            shape: response.shape,
            chunks: response.chunks.clone(),
            data_length: response.data_length,
            file_size: response.file_size,
        };
        if let Err(e) = cache.put(file, chunk_size, &record) {
            log::warn!("[DataSource] layout cache write failed: {:#}", e);
        }
    }

    fn cache_get(&self, file: &str, chunk_size: u64, index: u32) -> Option<(Vec<f64>, f64, f64)> {
        let cache = self.byte_cache.as_ref()?;
        let hit = match cache.get(file, chunk_size, index) {
            Ok(hit) => hit?,
            Err(e) => {
                log::warn!("[DataSource] byte cache read failed: {:#}", e);
                return None;
            }
        };
        match field::decode_f64_le(&hit.bytes) {
            Ok(values) => Some((values, hit.min, hit.max)),
            Err(e) => {
                log::warn!("[DataSource] cached chunk {} undecodable: {:#}", index, e);
                None
            }
        }
    }

    /// Every chunk of the layout from the byte cache, or `None` on the first
    /// miss (partial hits go through the full preprocess path)
    fn all_cached(&self, file: &str, chunk_size: u64, layout: &LayoutRecord) -> Option<Vec<ChunkData>> {
        if layout.chunks.is_empty() {
            return None;
        }
        let mut chunks = Vec::with_capacity(layout.chunks.len());
        for descriptor in &layout.chunks {
            let (values, min, max) = self.cache_get(file, chunk_size, descriptor.index)?;
            chunks.push(ChunkData {
                index: descriptor.index,
                values,
                min,
                max,
                from_cache: true,
            });
        }
        Some(chunks)
    }

    /// Queue network-sourced chunks for cache writeback on a detached task.
    /// The copies are taken here because the originals move into the merged
    /// buffer; the writes themselves run after a short idle delay and never
    /// delay the load.
    fn schedule_writeback(&self, file: &str, chunk_size: u64, chunks: &[ChunkData]) {
        let Some(cache) = &self.byte_cache else {
            return;
        };
        let copies: Vec<(u32, Vec<f64>, f64, f64)> = chunks
            .iter()
            .filter(|c| !c.from_cache)
            .map(|c| (c.index, c.values.clone(), c.min, c.max))
            .collect();
        if copies.is_empty() {
            return;
        }

        let cache = Arc::clone(cache);
        let file = file.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(constants::IDLE_FALLBACK_DELAY_MS)).await;
            let timestamp = now_ms();
            for (index, values, min, max) in copies {
                let bytes = field::encode_f64_le(&values);
                if let Err(e) = cache.put(&file, chunk_size, index, &bytes, min, max, timestamp) {
                    log::warn!("[DataSource] writeback of chunk {} failed: {:#}", index, e);
                }
            }
        });
    }

    /// Pull the server's records for a session and fold them into the local
    /// trace store
    pub async fn merge_server_trace(&self, tracker: &PerformanceTracker) {
        match self.client.fetch_performance(tracker.session_id()).await {
            Ok(records) => tracker.merge_server_records(records),
            Err(e) => log::warn!("[DataSource] server trace pull failed: {}", e),
        }
    }

    pub fn byte_cache(&self) -> Option<&Arc<LocalByteCache>> {
        self.byte_cache.as_ref()
    }
}

/// Index-ordered concatenation with the integrity and extrema folds
fn merge(
    mut chunks: Vec<ChunkData>,
    shape: Shape,
    data_length: u64,
    task_id: Option<String>,
    all_from_cache: bool,
    load_start: Instant,
) -> Result<LoadResult, LoadError> {
    chunks.sort_by_key(|c| c.index);

    let total: u64 = chunks.iter().map(|c| c.values.len() as u64).sum();
    if total != data_length {
        return Err(LoadError::MergeSizeMismatch {
            expected: data_length,
            actual: total,
        });
    }

    let mut values = Vec::with_capacity(data_length as usize);
    let mut min_max: Option<(f64, f64)> = None;
    let mut summaries = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        summaries.push(ChunkSummary {
            index: chunk.index,
            len: chunk.values.len() as u64,
            min: chunk.min,
            max: chunk.max,
            from_cache: chunk.from_cache,
        });
        min_max = match min_max {
            None => Some((chunk.min, chunk.max)),
            Some((min, max)) => Some((min.min(chunk.min), max.max(chunk.max))),
        };
        values.extend(chunk.values);
    }

    Ok(LoadResult {
        values,
        shape,
        data_length,
        min_max,
        task_id,
        fetch_ms: load_start.elapsed().as_millis() as u64,
        all_from_cache,
        chunks: summaries,
    })
}
