// Load command - run a full client load against a server
use super::utils::{default_cache_dir, format_bytes};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use voxelstream::constants;
use voxelstream::data_source::{DataSource, DataSourceConfig};
use voxelstream::tracker::PerformanceTracker;

#[derive(Args)]
#[command(
    about = "Load a field from a server",
    long_about = "Run a complete client load: consult the local layout and chunk caches,
preprocess when needed, fan chunk fetches out over parallel lanes, merge the
results and print the field's shape and global min/max.

A second load of the same file and chunk size is served entirely from the
local cache without touching the network."
)]
pub struct LoadCommand {
    /// Server base URL (e.g., http://127.0.0.1:8080)
    pub server: String,

    /// Field file name relative to the server's data directory
    pub file: String,

    /// Chunk size in samples
    #[arg(long, default_value = "65536")]
    pub chunk_size: u64,

    /// Local cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Maximum parallel fetch lanes (capped at 5)
    #[arg(long, default_value_t = constants::MAX_LANES)]
    pub lanes: usize,

    /// Record a performance trace and print it after the load
    #[arg(long)]
    pub trace: bool,

    /// Bypass the local caches entirely
    #[arg(long)]
    pub no_cache: bool,
}

pub fn run(cmd: LoadCommand, quiet: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(run_load(cmd, quiet))
}

async fn run_load(cmd: LoadCommand, quiet: bool) -> Result<()> {
    let cache_dir = cmd.cache_dir.unwrap_or_else(default_cache_dir);

    let mut config = DataSourceConfig::new(&cmd.server, &cache_dir);
    config.max_lanes = cmd.lanes;
    config.use_cache = !cmd.no_cache;
    let source = DataSource::new(config)?;

    let tracker = cmd.trace.then(|| PerformanceTracker::new(&cache_dir));

    let result = source
        .load_data(&cmd.file, cmd.chunk_size, tracker.as_ref())
        .await?;

    if !quiet {
        println!("file:        {}", cmd.file);
        println!("shape:       {}", result.shape);
        println!("samples:     {}", result.data_length);
        println!("bytes:       {}", format_bytes(result.data_length * 8));
        match result.min_max {
            Some((min, max)) => println!("min/max:     {} / {}", min, max),
            None => println!("min/max:     (empty field)"),
        }
        println!("chunks:      {}", result.chunks.len());
        let cached = result.chunks.iter().filter(|c| c.from_cache).count();
        println!("from cache:  {}/{}", cached, result.chunks.len());
        println!("fetch time:  {} ms", result.fetch_ms);
        match &result.task_id {
            Some(task_id) => println!("task:        {}", task_id),
            None => println!("task:        (cache only)"),
        }
    }

    if let Some(tracker) = tracker {
        // fold server-side records into the session before printing it
        source.merge_server_trace(&tracker).await;
        tracker.complete(Some(serde_json::json!({
            "file": cmd.file,
            "chunk_size": cmd.chunk_size,
            "all_from_cache": result.all_from_cache,
        })));

        if !quiet {
            println!("\ntrace session: {}", tracker.session_id());
            println!(
                "view with: {} perf {} --cache-dir {}",
                constants::BINARY_NAME,
                tracker.session_id(),
                cache_dir.display()
            );
        }
    }

    Ok(())
}
