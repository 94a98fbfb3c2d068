// Inspect command - header-only report for a local field file
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use voxelstream::field;
use voxelstream::parser;

#[derive(Args)]
#[command(about = "Inspect a local field file (header only)")]
pub struct InspectCommand {
    /// Field file path
    pub path: PathBuf,

    /// Also print the chunk layout for this chunk size
    #[arg(long)]
    pub chunk_size: Option<u64>,
}

pub fn run(cmd: InspectCommand) -> Result<()> {
    let parser = parser::parser_for(&cmd.path)
        .ok_or_else(|| anyhow::anyhow!("no parser for file: {}", cmd.path.display()))?;

    let shape = parser.shape_only(&cmd.path)?;
    let data_length = shape.len();
    let file_size = std::fs::metadata(&cmd.path)?.len();

    println!("file:       {}", cmd.path.display());
    println!("file size:  {} bytes", file_size);
    println!("shape:      {}", shape);
    println!("samples:    {}", data_length);
    println!("payload:    {} bytes", data_length * 8);

    if let Some(chunk_size) = cmd.chunk_size {
        if chunk_size == 0 {
            anyhow::bail!("chunk size must be >= 1");
        }
        let chunks = field::derive_chunks(data_length, chunk_size);
        println!("\nchunks ({} at size {}):", chunks.len(), chunk_size);
        for c in &chunks {
            println!("  {:>4}  [{}, {})  {} samples", c.index, c.start, c.end, c.len());
        }
    }

    Ok(())
}
