//! Preprocess service: validate, read the shape header, register a task and
//! reply immediately while a background job parses and fills the chunk slots

use crate::field::{self, ChunkDescriptor, Shape};
use crate::parser::{self, FieldParser};
use crate::perf::{ChannelIndex, PerfRecord, now_ms};
use crate::perf_store::PerfStore;
use crate::registry::TaskRegistry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessRequest {
    pub file: String,
    pub chunk_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessResponse {
    pub task_id: String,
    pub file: String,
    pub file_size: u64,
    pub shape: Shape,
    pub data_length: u64,
    pub chunk_size: u64,
    pub chunks: Vec<ChunkDescriptor>,
}

/// Split so the HTTP layer can map validation to 400 and the rest to 500
#[derive(Debug)]
pub enum PreprocessError {
    Validation(String),
    Internal(anyhow::Error),
}

impl std::fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{}", msg),
            Self::Internal(e) => write!(f, "{:#}", e),
        }
    }
}

/// Confine `file` to the data root and resolve its parser. Rejects empty
/// names, absolute paths, traversal components and unknown extensions.
fn resolve_file(
    data_root: &Path,
    file: &str,
) -> Result<(PathBuf, &'static dyn FieldParser), PreprocessError> {
    if file.is_empty() {
        return Err(PreprocessError::Validation("file must not be empty".to_string()));
    }

    let rel = Path::new(file);
    if rel.is_absolute()
        || rel
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(PreprocessError::Validation(format!(
            "file must be a plain relative path: {}",
            file
        )));
    }

    let path = data_root.join(rel);
    if !path.is_file() {
        return Err(PreprocessError::Validation(format!("file not found: {}", file)));
    }

    let parser = parser_for_or_validation(&path, file)?;
    Ok((path, parser))
}

fn parser_for_or_validation(
    path: &Path,
    file: &str,
) -> Result<&'static dyn FieldParser, PreprocessError> {
    parser::parser_for(path).ok_or_else(|| {
        PreprocessError::Validation(format!("no parser for file extension: {}", file))
    })
}

/// Handle a preprocess request: returns with `task_id`, shape and chunk
/// layout after the header read; the payload parse runs in a spawned job.
pub async fn preprocess(
    registry: Arc<TaskRegistry>,
    perf: Arc<PerfStore>,
    data_root: &Path,
    req: PreprocessRequest,
) -> Result<PreprocessResponse, PreprocessError> {
    if req.chunk_size < 1 {
        return Err(PreprocessError::Validation("chunk_size must be >= 1".to_string()));
    }

    let (path, parser) = resolve_file(data_root, &req.file)?;
    let file_size = std::fs::metadata(&path)
        .map_err(|e| PreprocessError::Internal(e.into()))?
        .len();

    let shape_start = now_ms();
    let shape = {
        let path = path.clone();
        tokio::task::spawn_blocking(move || parser.shape_only(&path))
            .await
            .map_err(|e| PreprocessError::Internal(e.into()))?
            .map_err(PreprocessError::Internal)?
    };

    let data_length = shape.len();
    let chunks = field::derive_chunks(data_length, req.chunk_size);
    let task_id = registry.create(shape, data_length, req.chunk_size, &chunks);

    if let Some(session_id) = &req.session_id {
        perf.record(
            session_id,
            PerfRecord {
                start_ms: shape_start,
                end_ms: now_ms(),
                channel_group: "server".to_string(),
                channel_index: ChannelIndex::Name("preprocess".to_string()),
                msg: format!("shape read {}", req.file),
            },
        );
    }

    spawn_fill_job(
        Arc::clone(&registry),
        perf,
        parser,
        path,
        task_id.clone(),
        chunks.clone(),
        req.session_id.clone(),
    );

    Ok(PreprocessResponse {
        task_id,
        file: req.file,
        file_size,
        shape,
        data_length,
        chunk_size: req.chunk_size,
        chunks,
    })
}

/// Fire-and-forget payload parse. Slicing and encoding fan out per chunk;
/// slot fill order between chunks is unconstrained. A parse failure is
/// recorded against the task so waiting consumers see it.
fn spawn_fill_job(
    registry: Arc<TaskRegistry>,
    perf: Arc<PerfStore>,
    parser: &'static dyn FieldParser,
    path: PathBuf,
    task_id: String,
    chunks: Vec<ChunkDescriptor>,
    session_id: Option<String>,
) {
    tokio::spawn(async move {
        let parse_start = now_ms();
        let parsed = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || parser.full(&path)).await
        };

        let values = match parsed {
            Ok(Ok((_, values))) => values,
            Ok(Err(e)) => {
                log::error!("[Preprocess] parse failed for {}: {:#}", path.display(), e);
                registry.fail(&task_id, format!("parse failed: {:#}", e));
                return;
            }
            Err(e) => {
                log::error!("[Preprocess] parse task panicked for {}: {}", path.display(), e);
                registry.fail(&task_id, "parse task panicked");
                return;
            }
        };

        let encoded: Vec<(u32, Vec<u8>)> = chunks
            .par_iter()
            .map(|c| {
                let slice = &values[c.start as usize..c.end as usize];
                (c.index, field::encode_f64_le(slice))
            })
            .collect();

        for (index, bytes) in encoded {
            if let Err(e) = registry.set_chunk(&task_id, index, bytes) {
                // the task was swept or consumed mid-fill; later chunks would fail too
                log::warn!("[Preprocess] dropping fill for task {}: {:#}", task_id, e);
                return;
            }
        }

        if let Some(session_id) = &session_id {
            perf.record(
                session_id,
                PerfRecord {
                    start_ms: parse_start,
                    end_ms: now_ms(),
                    channel_group: "server".to_string(),
                    channel_index: ChannelIndex::Name("parse".to_string()),
                    msg: format!("parsed and sliced {} chunks", chunks.len()),
                },
            );
        }

        log::debug!("[Preprocess] task {} filled ({} chunks)", task_id, chunks.len());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TakeResult;
    use std::io::Write;
    use std::time::Duration;

    fn write_vxg(dir: &Path, name: &str, shape: Shape) -> Vec<f64> {
        let values: Vec<f64> = (0..shape.len()).map(|i| i as f64 * 0.25).collect();
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(b"VXG1").unwrap();
        for d in [shape.nx, shape.ny, shape.nz] {
            file.write_all(&d.to_le_bytes()).unwrap();
        }
        file.write_all(&field::encode_f64_le(&values)).unwrap();
        values
    }

    fn services() -> (Arc<TaskRegistry>, Arc<PerfStore>) {
        (
            Arc::new(TaskRegistry::new(Duration::from_secs(60))),
            Arc::new(PerfStore::new()),
        )
    }

    #[tokio::test]
    async fn test_preprocess_layout_and_fill() {
        let dir = tempfile::tempdir().unwrap();
        let values = write_vxg(dir.path(), "field.vxg", Shape::new(4, 4, 4));
        let (registry, perf) = services();

        let resp = preprocess(
            Arc::clone(&registry),
            perf,
            dir.path(),
            PreprocessRequest {
                file: "field.vxg".to_string(),
                chunk_size: 20,
                session_id: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(resp.data_length, 64);
        assert_eq!(resp.chunks.len(), 4);
        assert_eq!(resp.chunks[3].end, 64);

        // the fill job runs concurrently; poll until the first chunk lands
        let bytes = loop {
            match registry.take_chunk(&resp.task_id, 0) {
                TakeResult::Ready(bytes) => break bytes,
                TakeResult::NotReady => tokio::time::sleep(Duration::from_millis(5)).await,
                other => panic!("unexpected take result: {:?}", other),
            }
        };
        assert_eq!(field::decode_f64_le(&bytes).unwrap(), &values[0..20]);
    }

    #[tokio::test]
    async fn test_preprocess_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        write_vxg(dir.path(), "field.vxg", Shape::new(2, 2, 2));
        let (registry, perf) = services();

        for (file, chunk_size) in [
            ("", 8u64),
            ("missing.vxg", 8),
            ("field.txt", 8),
            ("../field.vxg", 8),
            ("field.vxg", 0),
        ] {
            let err = preprocess(
                Arc::clone(&registry),
                Arc::clone(&perf),
                dir.path(),
                PreprocessRequest {
                    file: file.to_string(),
                    chunk_size,
                    session_id: None,
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, PreprocessError::Validation(_)), "input {:?}", file);
        }
    }

    #[tokio::test]
    async fn test_preprocess_records_session_trace() {
        let dir = tempfile::tempdir().unwrap();
        write_vxg(dir.path(), "field.vxg", Shape::new(2, 2, 2));
        let (registry, perf) = services();

        preprocess(
            registry,
            Arc::clone(&perf),
            dir.path(),
            PreprocessRequest {
                file: "field.vxg".to_string(),
                chunk_size: 4,
                session_id: Some("sess-1".to_string()),
            },
        )
        .await
        .unwrap();

        let records = perf.records("sess-1");
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.channel_group == "server"));
    }
}
