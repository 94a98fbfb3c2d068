// Constants for version, protocol paths and tuning knobs

/// Binary name used in user agents and metadata
pub const BINARY_NAME: &str = "voxelstream";

/// Package version from Cargo.toml (set at compile time)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the user agent string for HTTP requests
pub fn user_agent() -> String {
    format!("{}/{}", BINARY_NAME, VERSION)
}

// ============================================================================
// Protocol Paths
// ============================================================================

/// Preprocess endpoint (POST)
pub const PREPROCESS_PATH: &str = "/voxel-grid/preprocess";

/// Chunk delivery endpoint (GET, destructive read)
pub const CHUNK_PATH: &str = "/voxel-grid/chunk";

/// Session trace endpoint (GET)
pub const PERFORMANCE_PATH: &str = "/performance";

// ============================================================================
// Fetch Lane Constants
// ============================================================================

/// Hard ceiling on parallel fetch lanes; configs may lower this, never raise it
pub const MAX_LANES: usize = 5;

/// First retry delay after a not-ready chunk response (doubles per attempt)
pub const RETRY_BASE_DELAY_MS: u64 = 100;

/// Retry cap for a single chunk; the default schedule totals ~102 s
pub const MAX_CHUNK_RETRIES: u32 = 10;

// ============================================================================
// Timeout Constants
// ============================================================================

/// Default HTTP request timeout
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Server-side task lifetime before the sweeper reclaims it
pub const DEFAULT_TASK_TTL_SECS: u64 = 600;

/// Interval between registry sweeps
pub const TASK_SWEEP_INTERVAL_SECS: u64 = 30;

// ============================================================================
// Client Cache Constants
// ============================================================================

/// Byte cache file name inside the cache directory
pub const BYTE_CACHE_FILE: &str = "chunk-cache.sqlite";

/// Layout cache file name inside the cache directory
pub const LAYOUT_CACHE_FILE: &str = "layout-cache.json";

/// Perf session store file name inside the cache directory
pub const PERF_DB_FILE: &str = "perf-sessions.sqlite";

/// Byte cache schema version (stored in sqlite `user_version`)
pub const BYTE_CACHE_SCHEMA_VERSION: i32 = 2;

/// Layout cache key prefix, kept wire-compatible with the original store
pub const LAYOUT_KEY_PREFIX: &str = "voxel-grid-shape";

/// Default eviction age for cached chunk bytes (7 days)
pub const CACHE_MAX_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Upper bound on how long a writeback may stay queued before it runs
pub const IDLE_WRITEBACK_TIMEOUT_MS: u64 = 5_000;

/// Delay before a queued writeback runs when no idle signal is available
pub const IDLE_FALLBACK_DELAY_MS: u64 = 1_000;
