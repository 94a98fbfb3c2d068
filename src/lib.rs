// src/lib.rs
pub mod byte_cache;
pub mod chunk_client;
pub mod constants;
pub mod data_source;
pub mod error;
pub mod field;
pub mod lanes;
pub mod layout_cache;
pub mod mesher;
pub mod parser;
pub mod perf;
pub mod perf_store;
pub mod preprocess;
pub mod registry;
pub mod runtime;
pub mod tracker;
#[cfg(feature = "server")]
pub mod server;

// Re-export main types
pub use byte_cache::{CachedChunk, LocalByteCache};
pub use chunk_client::{ChunkClient, RetryPolicy};
pub use data_source::{ChunkSummary, DataSource, DataSourceConfig, LoadResult};
pub use error::LoadError;
pub use field::{ChunkDescriptor, Shape, derive_chunks};
pub use layout_cache::{LayoutCache, LayoutRecord};
pub use mesher::{SurfaceMesh, SurfaceMesher};
pub use parser::{FieldParser, parser_for};
pub use perf::{ChannelIndex, PerfRecord, PerfSession};
pub use perf_store::PerfStore;
pub use preprocess::{PreprocessRequest, PreprocessResponse};
pub use registry::{RegistryStats, TakeResult, TaskRegistry, TaskSnapshot};
pub use tracker::{PerfDb, PerformanceTracker};
