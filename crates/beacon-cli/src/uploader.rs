//! Host side of the upload task protocol

use anyhow::{Context, Result};
use async_trait::async_trait;
use beacon_core::{Beacon, PingRequest, PingUploadTask, UploadOutcome, UploadResult};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shortest pause honored for a `Wait` task
pub const MIN_WAIT: Duration = Duration::from_millis(100);

/// Performs one upload attempt (allows mocking in tests)
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Attempt to deliver `request`. Local failures are reported as
    /// [`UploadResult::Recoverable`], never as errors.
    async fn upload(&self, request: &PingRequest) -> UploadResult;
}

/// Uploads pings over HTTP
pub struct HttpUploader {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, request: &PingRequest) -> UploadResult {
        let url = format!("{}{}", self.endpoint, request.path);
        debug!("POST {} ({} bytes)", url, request.body.len());

        let mut builder = self.client.post(&url).body(request.body.clone());
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        match builder.send().await {
            Ok(response) => UploadResult::HttpStatus(u32::from(response.status().as_u16())),
            Err(e) => {
                warn!("Upload of {} failed: {}", request.document_id, e);
                UploadResult::Recoverable
            }
        }
    }
}

/// Writes each ping to `<dir>/<document_id>.json`
pub struct DirectoryUploader {
    dir: PathBuf,
}

impl DirectoryUploader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Uploader for DirectoryUploader {
    async fn upload(&self, request: &PingRequest) -> UploadResult {
        let path = self.dir.join(format!("{}.json", request.document_id));
        let written = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&path, &request.body).await
        }
        .await;

        match written {
            Ok(()) => {
                debug!("Wrote {}", path.display());
                UploadResult::HttpStatus(200)
            }
            Err(e) => {
                warn!("Failed to write {}: {}", path.display(), e);
                UploadResult::Recoverable
            }
        }
    }
}

/// Knobs for [`drain`]
#[derive(Debug, Clone)]
pub struct DrainOptions {
    /// Log each ping body as it is handed out
    pub log_pings: bool,
    /// Stop polling after this long even if pings remain
    pub deadline: Option<Duration>,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            log_pings: false,
            deadline: Some(Duration::from_secs(60)),
        }
    }
}

/// What a [`drain`] run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub sent: usize,
    pub discarded: usize,
    pub retried: usize,
    /// Pings still queued when draining stopped
    pub pending: usize,
}

/// Pull upload tasks until the queue reports `Done`, reporting every attempt
pub async fn drain(
    beacon: &Beacon,
    uploader: &dyn Uploader,
    options: &DrainOptions,
) -> Result<DrainSummary> {
    let started = Instant::now();
    let mut summary = DrainSummary::default();

    loop {
        if let Some(deadline) = options.deadline {
            if started.elapsed() >= deadline {
                summary.pending = beacon.pending_uploads();
                warn!(
                    "Giving up after {:?} with {} ping(s) still queued",
                    deadline, summary.pending
                );
                return Ok(summary);
            }
        }

        match beacon.get_upload_task(options.log_pings) {
            PingUploadTask::Upload { request, attempt } => {
                let result = uploader.upload(&request).await;
                let outcome = beacon
                    .process_upload_response(&request.document_id, attempt, result)
                    .with_context(|| format!("Failed to report upload of {}", request.document_id))?;
                match outcome {
                    UploadOutcome::Sent => summary.sent += 1,
                    UploadOutcome::Discarded => summary.discarded += 1,
                    UploadOutcome::Requeued { .. } => summary.retried += 1,
                }
            }
            PingUploadTask::Wait(ms) => {
                let wait = Duration::from_millis(ms).max(MIN_WAIT);
                debug!("Upload queue asked to wait {:?}", wait);
                tokio::time::sleep(wait).await;
            }
            PingUploadTask::Done => break,
        }
    }

    info!(
        "Upload queue drained: {} sent, {} discarded, {} retried",
        summary.sent, summary.discarded, summary.retried
    );
    Ok(summary)
}
