//! HTTP client for the voxel-grid endpoints: preprocess POST, destructive
//! chunk GET with exponential-backoff polling, and session trace pulls

use crate::constants;
use crate::error::LoadError;
use crate::perf::PerfRecord;
use crate::preprocess::{PreprocessRequest, PreprocessResponse};
use anyhow::Result;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Backoff schedule for not-ready chunks. The default waits 100, 200, 400,
/// ... 51 200 ms and gives up after the tenth retry (~102 s total).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(constants::RETRY_BASE_DELAY_MS),
            max_attempts: constants::MAX_CHUNK_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based): base * 2^attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Worst-case total wait across the whole schedule
    pub fn total_wait(&self) -> Duration {
        (0..self.max_attempts).map(|a| self.delay_for(a)).sum()
    }
}

pub struct ChunkClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl ChunkClient {
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(constants::HTTP_TIMEOUT_SECS))
                .build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Ask the server to register a task for `file`; returns with the shape
    /// and chunk layout while the parse continues server-side
    pub async fn preprocess(
        &self,
        file: &str,
        chunk_size: u64,
        session_id: Option<&str>,
    ) -> Result<PreprocessResponse, LoadError> {
        let url = format!("{}{}", self.base_url, constants::PREPROCESS_PATH);
        let body = PreprocessRequest {
            file: file.to_string(),
            chunk_size,
            session_id: session_id.map(str::to_string),
        };

        let response = self
            .client
            .post(&url)
            .header("User-Agent", constants::user_agent())
            .json(&body)
            .send()
            .await
            .map_err(|e| LoadError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| LoadError::Transport(e.to_string()))?;
                sonic_rs::from_str(&text)
                    .map_err(|e| LoadError::Transport(format!("bad preprocess response: {}", e)))
            }
            StatusCode::BAD_REQUEST => Err(classify_validation(error_message(response).await)),
            status => Err(LoadError::Transport(format!(
                "preprocess failed with status {}: {}",
                status,
                error_message(response).await
            ))),
        }
    }

    /// Destructive chunk read with the not-ready polling machine. Exactly one
    /// successful read exists per (task, index); a second consumer sees the
    /// chunk-gone error.
    pub async fn fetch_chunk(
        &self,
        task_id: &str,
        chunk_index: u32,
        session_id: Option<&str>,
    ) -> Result<Vec<u8>, LoadError> {
        let url = format!("{}{}", self.base_url, constants::CHUNK_PATH);
        let chunk_index_param = chunk_index.to_string();
        let mut attempts = 0u32;

        loop {
            let mut request = self.client.get(&url).query(&[
                ("task_id", task_id),
                ("chunk_index", chunk_index_param.as_str()),
            ]);
            if let Some(session_id) = session_id {
                request = request.query(&[("session_id", session_id)]);
            }

            let response = request
                .header("User-Agent", constants::user_agent())
                .send()
                .await
                .map_err(|e| LoadError::Transport(e.to_string()))?;

            match response.status() {
                StatusCode::OK => {
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| LoadError::Transport(e.to_string()))?;
                    return Ok(bytes.to_vec());
                }
                StatusCode::ACCEPTED => {
                    if attempts == self.retry.max_attempts {
                        return Err(LoadError::ChunkTimeout {
                            index: chunk_index,
                            attempts,
                        });
                    }
                    let delay = self.retry.delay_for(attempts);
                    log::debug!(
                        "[ChunkClient] chunk {} not ready, retry {}/{} in {:?}",
                        chunk_index,
                        attempts + 1,
                        self.retry.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                }
                StatusCode::NOT_FOUND => {
                    return Err(LoadError::TaskExpired(error_message(response).await));
                }
                StatusCode::BAD_REQUEST => {
                    return Err(LoadError::ChunkGone { index: chunk_index });
                }
                StatusCode::INTERNAL_SERVER_ERROR => {
                    return Err(LoadError::TaskFailed(error_message(response).await));
                }
                status => {
                    return Err(LoadError::Transport(format!(
                        "chunk {} request failed with status {}: {}",
                        chunk_index,
                        status,
                        error_message(response).await
                    )));
                }
            }
        }
    }

    /// Pull the server-side records for a session
    pub async fn fetch_performance(&self, session_id: &str) -> Result<Vec<PerfRecord>, LoadError> {
        #[derive(Deserialize)]
        struct PerformanceResponse {
            records: Vec<PerfRecord>,
        }

        let url = format!("{}{}", self.base_url, constants::PERFORMANCE_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[("session_id", session_id)])
            .header("User-Agent", constants::user_agent())
            .send()
            .await
            .map_err(|e| LoadError::Transport(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(LoadError::Transport(format!(
                "performance fetch failed with status {}",
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| LoadError::Transport(e.to_string()))?;
        let parsed: PerformanceResponse = sonic_rs::from_str(&text)
            .map_err(|e| LoadError::Transport(format!("bad performance response: {}", e)))?;
        Ok(parsed.records)
    }
}

/// Sort a preprocess rejection into the load-error taxonomy by its message
fn classify_validation(msg: String) -> LoadError {
    if msg.contains("file not found") {
        LoadError::UnknownFile(msg)
    } else if msg.contains("no parser") {
        LoadError::ParserNotFound(msg)
    } else {
        LoadError::Validation(msg)
    }
}

/// Best-effort extraction of a `{"error": ...}` body; falls back to raw text
async fn error_message(response: reqwest::Response) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    let status = response.status();
    match response.text().await {
        Ok(text) => match sonic_rs::from_str::<ErrorBody>(&text) {
            Ok(body) => body.error,
            Err(_) if !text.is_empty() => text,
            Err(_) => status.to_string(),
        },
        Err(_) => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_schedule() {
        let policy = RetryPolicy::default();
        let expected_ms = [100u64, 200, 400, 800, 1_600, 3_200, 6_400, 12_800, 25_600, 51_200];
        for (attempt, &ms) in expected_ms.iter().enumerate() {
            assert_eq!(policy.delay_for(attempt as u32), Duration::from_millis(ms));
        }
        assert_eq!(policy.total_wait(), Duration::from_millis(102_300));
    }

    #[test]
    fn test_validation_classification() {
        assert!(matches!(
            classify_validation("file not found: a.vxg".to_string()),
            LoadError::UnknownFile(_)
        ));
        assert!(matches!(
            classify_validation("no parser for file extension: a.csv".to_string()),
            LoadError::ParserNotFound(_)
        ));
        assert!(matches!(
            classify_validation("chunk_size must be >= 1".to_string()),
            LoadError::Validation(_)
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let client = ChunkClient::new("http://localhost:8080/", RetryPolicy::default()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
