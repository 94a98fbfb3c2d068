use anyhow::Result;
use clap::{Parser, Subcommand};

// CLI Commands (cmd_ prefix)
mod cmd_cache;
mod cmd_inspect;
mod cmd_load;
mod cmd_perf;
mod cmd_serve;

// Helper modules (no cmd_ prefix)
mod logger;
mod utils;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "voxelstream")]
#[command(version = VERSION)]
#[command(about = concat!("voxelstream v", env!("CARGO_PKG_VERSION"), " - chunked voxel field streaming"))]
#[command(long_about = concat!(
    "voxelstream v", env!("CARGO_PKG_VERSION"), " - chunked voxel field streaming\n\n",
    "Streams large 3-D scalar fields in chunks: a server parses field files\n",
    "and hands out little-endian f64 chunks with at-most-once delivery; the\n",
    "client fetches them over parallel lanes, merges them in order and keeps\n",
    "a persistent local chunk cache."
))]
#[command(propagate_version = true)]
struct Cli {
    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Serve(cmd_serve::ServeCommand),
    Load(cmd_load::LoadCommand),
    Inspect(cmd_inspect::InspectCommand),
    Cache(cmd_cache::CacheCommand),
    Perf(cmd_perf::PerfCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger based on verbosity flags
    logger::init_logger(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Serve(cmd) => cmd_serve::run(cmd, cli.verbose)?,
        Commands::Load(cmd) => cmd_load::run(cmd, cli.quiet)?,
        Commands::Inspect(cmd) => cmd_inspect::run(cmd)?,
        Commands::Cache(cmd) => cmd_cache::run(cmd)?,
        Commands::Perf(cmd) => cmd_perf::run(cmd)?,
    }

    Ok(())
}
