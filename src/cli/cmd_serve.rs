// Serve command - start HTTP server
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[cfg(feature = "server")]
use tokio::time::Duration;

#[cfg(feature = "server")]
use voxelstream::server::{StartupConfig, start_server};

#[cfg(feature = "server")]
fn parse_duration_for_clap(s: &str) -> Result<Duration, String> {
    super::utils::parse_duration(s).map_err(|e| e.to_string())
}

#[derive(Args)]
#[command(
    about = "Start HTTP server",
    long_about = "Start the HTTP server that parses field files and hands out chunks.

A preprocess request registers a task and returns its chunk layout while the
payload parse continues in the background; chunks are then fetched one by one
with at-most-once delivery. Tasks that are never fully consumed are reclaimed
after the TTL."
)]
pub struct ServeCommand {
    /// HTTP server port
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// HTTP server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory containing the served field files
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Task lifetime before an unconsumed task is reclaimed (e.g., "10m")
    #[cfg(feature = "server")]
    #[arg(long, default_value = "10m", value_parser = parse_duration_for_clap)]
    pub task_ttl: Duration,

    #[cfg(not(feature = "server"))]
    #[arg(long, default_value = "10m")]
    pub task_ttl: String,
}

pub fn run(cmd: ServeCommand, verbose: bool) -> Result<()> {
    #[cfg(not(feature = "server"))]
    {
        let _ = (cmd, verbose);
        anyhow::bail!("Server feature is not enabled. Rebuild with --features server");
    }

    #[cfg(feature = "server")]
    {
        use anyhow::Context;
        use tokio::runtime::Runtime;

        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        rt.block_on(start_server(StartupConfig {
            data_dir: cmd.data_dir,
            host: cmd.host,
            port: cmd.port,
            task_ttl: cmd.task_ttl,
            verbose,
        }))
    }
}
