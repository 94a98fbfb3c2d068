// Cache command - local chunk cache maintenance
use super::utils::{default_cache_dir, format_bytes};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use voxelstream::byte_cache::LocalByteCache;
use voxelstream::constants;
use voxelstream::perf::now_ms;

#[derive(Args)]
#[command(
    about = "Chunk cache maintenance",
    long_about = "Inspect or prune the local chunk cache. Without flags, prints cache
statistics. Eviction and deletion use the cache's secondary indexes and leave
unrelated entries untouched."
)]
pub struct CacheCommand {
    /// Cache directory
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Evict entries older than this many days
    #[arg(long, value_name = "DAYS")]
    pub evict_days: Option<i64>,

    /// Delete every cached chunk of one file
    #[arg(long, value_name = "FILE")]
    pub delete_file: Option<String>,

    /// Delete all cached chunks
    #[arg(long)]
    pub clear: bool,
}

pub fn run(cmd: CacheCommand) -> Result<()> {
    let dir = cmd.dir.unwrap_or_else(default_cache_dir);
    let cache = LocalByteCache::open(&dir)?;

    let mut acted = false;

    if let Some(file) = &cmd.delete_file {
        let deleted = cache.delete_by_file(file)?;
        println!("deleted {} chunk(s) of {}", deleted, file);
        acted = true;
    }

    if let Some(days) = cmd.evict_days {
        let max_age_ms = days
            .checked_mul(24 * 60 * 60 * 1000)
            .ok_or_else(|| anyhow::anyhow!("eviction age overflows"))?;
        let deleted = cache.evict(max_age_ms, now_ms())?;
        println!("evicted {} chunk(s) older than {} day(s)", deleted, days);
        acted = true;
    }

    if cmd.clear {
        cache.clear_all()?;
        println!("cache cleared");
        acted = true;
    }

    if !acted {
        let (entries, bytes) = cache.stats()?;
        println!("cache dir:  {}", dir.display());
        println!("entries:    {}", entries);
        println!("payload:    {}", format_bytes(bytes));
        println!(
            "default eviction age: {} days",
            constants::CACHE_MAX_AGE_MS / (24 * 60 * 60 * 1000)
        );
    }

    Ok(())
}
