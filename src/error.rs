//! Load-failure taxonomy observed by the client core

use thiserror::Error;

/// Errors a `DataSource` load can surface. Cache and tracker failures are
/// deliberately absent: those degrade or get logged, never abort a load.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Bad preprocess input (server 400)
    #[error("validation failed: {0}")]
    Validation(String),

    /// File missing under the server's data root
    #[error("unknown file: {0}")]
    UnknownFile(String),

    /// No parser registered for the file extension
    #[error("no parser for file: {0}")]
    ParserNotFound(String),

    /// Chunk still not ready after the full retry schedule
    #[error("chunk {index} not ready after {attempts} retries")]
    ChunkTimeout { index: u32, attempts: u32 },

    /// Chunk already consumed by another reader (server 400)
    #[error("chunk {index} already consumed")]
    ChunkGone { index: u32 },

    /// Task no longer in the registry (server 404); restart from preprocess
    #[error("task expired: {0}")]
    TaskExpired(String),

    /// Server-side parse failure recorded against the task (server 500)
    #[error("task failed on server: {0}")]
    TaskFailed(String),

    /// Network failure or unexpected status
    #[error("transport error: {0}")]
    Transport(String),

    /// Sum of chunk element counts disagrees with the announced data length
    #[error("merged {actual} elements, expected {expected}")]
    MergeSizeMismatch { expected: u64, actual: u64 },

    /// A fetched chunk decoded to zero samples
    #[error("chunk {index} is empty")]
    EmptyChunk { index: u32 },
}
