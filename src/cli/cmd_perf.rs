// Perf command - print a session's merged trace
use super::utils::default_cache_dir;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use voxelstream::chunk_client::{ChunkClient, RetryPolicy};
use voxelstream::tracker::{PerfDb, PerformanceTracker};

#[derive(Args)]
#[command(
    about = "Show a performance trace",
    long_about = "Print the records of a trace session ordered by start time. With
--server, server-side records are pulled and merged into the stored session
first. Without a session id, lists the stored sessions."
)]
pub struct PerfCommand {
    /// Trace session id (omit to list sessions)
    pub session_id: Option<String>,

    /// Pull and merge server-side records from this base URL first
    #[arg(long)]
    pub server: Option<String>,

    /// Cache directory holding the trace store
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

pub fn run(cmd: PerfCommand) -> Result<()> {
    let cache_dir = cmd.cache_dir.unwrap_or_else(default_cache_dir);
    let db = PerfDb::open(&cache_dir)?;

    let Some(session_id) = cmd.session_id else {
        let sessions = db.sessions()?;
        if sessions.is_empty() {
            println!("no stored sessions");
            return Ok(());
        }
        for (session_id, start, end) in sessions {
            println!("{}  {} ms  start={}", session_id, end - start, start);
        }
        return Ok(());
    };

    if let Some(server) = &cmd.server {
        let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
        rt.block_on(async {
            let client = ChunkClient::new(server, RetryPolicy::default())?;
            match client.fetch_performance(&session_id).await {
                Ok(records) => {
                    PerformanceTracker::for_session(&cache_dir, &session_id)
                        .merge_server_records(records);
                }
                Err(e) => eprintln!("Warning: server records unavailable: {}", e),
            }
            Ok::<(), anyhow::Error>(())
        })?;
    }

    let session = db
        .load(&session_id)?
        .ok_or_else(|| anyhow::anyhow!("session not found: {}", session_id))?;

    println!(
        "session {}  span {} ms  records {}",
        session.session_id,
        session.session_end_ms - session.session_start_ms,
        session.records.len()
    );

    let mut records = session.records;
    records.sort_by_key(|r| r.start_ms);
    for r in records {
        println!(
            "  +{:>7} ms  {:>6} ms  {:<8} {:<10} {}",
            r.start_ms - session.session_start_ms,
            r.end_ms - r.start_ms,
            r.channel_group,
            r.channel_index.to_string(),
            r.msg
        );
    }

    Ok(())
}
