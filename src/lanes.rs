//! Fetch lanes: bounded pool of background tasks, each serially owning its
//! share of chunk requests and replying with decoded buffers by move

use crate::chunk_client::ChunkClient;
use crate::error::LoadError;
use crate::field;
use crate::tracker::PerformanceTracker;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One chunk assignment for a lane
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub task_id: String,
    pub chunk_index: u32,
}

/// Lane reply: either the decoded chunk with its extrema, or the first error
/// the lane hit for that chunk
pub enum ChunkMessage {
    Chunk {
        chunk_index: u32,
        values: Vec<f64>,
        min: f64,
        max: f64,
    },
    Error {
        chunk_index: u32,
        error: LoadError,
    },
}

/// Ties lane trackers to the load's trace session
#[derive(Debug, Clone)]
pub struct LaneSession {
    pub cache_dir: PathBuf,
    pub session_id: String,
}

struct Lane {
    requests: mpsc::UnboundedSender<FetchRequest>,
    handle: JoinHandle<()>,
}

/// Pool of fetch lanes sharing one result channel. One request in produces
/// exactly one `ChunkMessage` out, keyed by chunk index; ordering only holds
/// within a lane.
pub struct LanePool {
    lanes: Vec<Lane>,
    results: mpsc::UnboundedReceiver<ChunkMessage>,
}

impl LanePool {
    pub fn spawn(client: Arc<ChunkClient>, lane_count: usize, session: Option<LaneSession>) -> Self {
        let (results_tx, results) = mpsc::unbounded_channel();

        let lanes = (0..lane_count)
            .map(|lane_index| {
                let (requests, rx) = mpsc::unbounded_channel();
                let handle = tokio::spawn(run_lane(
                    lane_index,
                    Arc::clone(&client),
                    rx,
                    results_tx.clone(),
                    session.clone(),
                ));
                Lane { requests, handle }
            })
            .collect();

        Self { lanes, results }
    }

    /// Queue a request on a lane; requests on one lane run in order
    pub fn dispatch(&self, lane: usize, request: FetchRequest) {
        // a closed lane only happens after terminate(), which consumes self
        let _ = self.lanes[lane].requests.send(request);
    }

    /// Next reply from any lane
    pub async fn next(&mut self) -> Option<ChunkMessage> {
        self.results.recv().await
    }

    /// Abort every lane. This is the cancellation primitive: outstanding
    /// fetches and their backoff timers die with the tasks.
    pub fn terminate(self) {
        for lane in &self.lanes {
            lane.handle.abort();
        }
    }
}

async fn run_lane(
    lane_index: usize,
    client: Arc<ChunkClient>,
    mut requests: mpsc::UnboundedReceiver<FetchRequest>,
    results: mpsc::UnboundedSender<ChunkMessage>,
    session: Option<LaneSession>,
) {
    // each lane joins the session with its own tracker; records converge in
    // the shared perf store
    let tracker = session
        .as_ref()
        .map(|s| PerformanceTracker::for_session(&s.cache_dir, &s.session_id));
    let session_id = session.as_ref().map(|s| s.session_id.as_str());

    while let Some(request) = requests.recv().await {
        let event = tracker.as_ref().map(|t| {
            t.start_event(
                "worker",
                lane_index as u32,
                format!("fetch chunk {}", request.chunk_index),
            )
        });

        let message = match fetch_one(&client, &request, session_id).await {
            Ok((values, min, max)) => ChunkMessage::Chunk {
                chunk_index: request.chunk_index,
                values,
                min,
                max,
            },
            Err(error) => ChunkMessage::Error {
                chunk_index: request.chunk_index,
                error,
            },
        };

        if let (Some(tracker), Some(event)) = (&tracker, event) {
            tracker.end_event(event);
            tracker.flush();
        }

        if results.send(message).is_err() {
            // the pool is gone; nothing left to reply to
            break;
        }
    }
}

async fn fetch_one(
    client: &ChunkClient,
    request: &FetchRequest,
    session_id: Option<&str>,
) -> Result<(Vec<f64>, f64, f64), LoadError> {
    let bytes = client
        .fetch_chunk(&request.task_id, request.chunk_index, session_id)
        .await?;

    let values = field::decode_f64_le(&bytes).map_err(|e| {
        LoadError::Transport(format!("chunk {} payload: {}", request.chunk_index, e))
    })?;

    let (min, max) = field::scan_min_max(&values).ok_or(LoadError::EmptyChunk {
        index: request.chunk_index,
    })?;

    Ok((values, min, max))
}
