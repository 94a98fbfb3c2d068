use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use voxelstream::field::{Shape, encode_f64_le};
use voxelstream::perf_store::PerfStore;
use voxelstream::registry::TaskRegistry;

pub fn setup_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(anyhow::Error::from)
}

/// Write a `.vxg` field whose sample at flat index i is `i * 0.5 - 3.0`,
/// returning the expected values
pub fn write_test_field(dir: &Path, name: &str, shape: Shape) -> Result<Vec<f64>> {
    let values: Vec<f64> = (0..shape.len()).map(|i| i as f64 * 0.5 - 3.0).collect();
    let mut file = std::fs::File::create(dir.join(name))?;
    file.write_all(b"VXG1")?;
    for d in [shape.nx, shape.ny, shape.nz] {
        file.write_all(&d.to_le_bytes())?;
    }
    file.write_all(&encode_f64_le(&values))?;
    Ok(values)
}

#[cfg(feature = "server")]
#[allow(dead_code)]
pub struct TestServer {
    pub base_url: String,
    pub registry: Arc<TaskRegistry>,
    pub perf: Arc<PerfStore>,
    handle: tokio::task::JoinHandle<()>,
}

#[cfg(feature = "server")]
impl TestServer {
    pub fn abort(&self) {
        self.handle.abort();
    }
}

#[cfg(feature = "server")]
pub async fn start_test_server(data_dir: &Path, task_ttl: Duration) -> Result<TestServer> {
    let registry = Arc::new(TaskRegistry::new(task_ttl));
    let perf = Arc::new(PerfStore::new());

    let config = voxelstream::server::ServerConfig {
        data_dir: data_dir.to_path_buf(),
        version: "test".to_string(),
    };
    let server =
        voxelstream::server::Server::new(Arc::clone(&registry), Arc::clone(&perf), config);
    let app = server.router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok(TestServer {
        base_url,
        registry,
        perf,
        handle,
    })
}

#[cfg(not(feature = "server"))]
pub async fn start_test_server(_data_dir: &Path, _task_ttl: Duration) -> Result<()> {
    anyhow::bail!("server feature not enabled for tests");
}
