//! Pipeline orchestration: the job state machine, dispatch, and failure translation.
//!
//! The service owns long-lived handles to the storage gateway, the job registry, both
//! stage queues, and the stage functions, so the HTTP surface and the worker pools share
//! one set of components. Construct the service once near process start and share it
//! through an `Arc`.
//!
//! Workers drain a queue until it reports empty, processing one message at a time. Every
//! per-message error is absorbed here: it is translated into a terminal failure status on
//! the job record and the drain loop moves on. At-least-once delivery means a message
//! may arrive again after it was already handled; each handler therefore checks the
//! job's current state and re-runs only when doing so reproduces the same writes.

/// Fixed-size worker pools that drain the stage queues.
pub mod worker;

use crate::config::get_config;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::queue::{self, JobMessage, Queue, QueueError};
use crate::registry::{self, JobRecord, JobStatus, JobUpdate, Registry, RegistryError};
use crate::stages::{
    self, ExtractionError, Extractor, SummarizationError, Summarizer,
};
use crate::storage::{self, Location, Storage, StorageError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

/// Errors surfaced to submission and query callers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No job exists for the supplied identifier.
    #[error("Unknown job: {0}")]
    JobNotFound(String),
    /// The extraction queue rejected the submission.
    #[error("The submission queue is full; retry later")]
    QueueFull,
    /// The uploaded document is not a supported type.
    #[error("Unsupported document type: {0}")]
    UnsupportedDocument(String),
    /// The uploaded document exceeds the configured size budget.
    #[error("Document exceeds the {limit}-byte upload limit")]
    DocumentTooLarge {
        /// Configured maximum in bytes.
        limit: usize,
    },
    /// The summary was requested before the job completed.
    #[error("Summary for job {job_id} is not available yet (status: {status})")]
    SummaryNotReady {
        /// Identifier of the queried job.
        job_id: String,
        /// Status observed at query time.
        status: JobStatus,
    },
    /// Storage gateway failure during submission or query.
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),
    /// Queue failure during submission, other than capacity exhaustion.
    #[error("Queue operation failed: {0}")]
    Queue(QueueError),
    /// Registry failure during submission or query.
    #[error("Registry operation failed: {0}")]
    Registry(RegistryError),
}

impl From<QueueError> for PipelineError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::Full => Self::QueueFull,
            other => Self::Queue(other),
        }
    }
}

impl From<RegistryError> for PipelineError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound(job_id) => Self::JobNotFound(job_id),
            other => Self::Registry(other),
        }
    }
}

/// Error raised while processing a single stage message.
///
/// Handlers return these instead of updating the registry themselves; the per-message
/// dispatcher is solely responsible for translating them into failure statuses.
#[derive(Debug, Error)]
pub(crate) enum StageError {
    /// The extraction stage reported a failure.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),
    /// The summarization stage reported a failure.
    #[error("{0}")]
    Summarization(#[from] SummarizationError),
    /// The storage gateway failed mid-stage.
    #[error("Storage gateway error: {0}")]
    Storage(#[from] StorageError),
    /// The registry failed mid-stage.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    /// Enqueueing the follow-up message failed.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    /// A stored text artifact was not valid UTF-8.
    #[error("Stored text artifact is not valid UTF-8")]
    MalformedArtifact,
}

/// Outcome of a stage handler that did not fail.
#[derive(Debug)]
enum StageOutcome {
    /// The job advanced along the state machine.
    Advanced,
    /// The message was redundant for the job's current state and was dropped.
    Skipped(JobStatus),
}

/// Receipt returned for an accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    /// Identifier assigned to the new job.
    pub job_id: String,
    /// Initial status of the job.
    pub status: JobStatus,
}

/// Abstraction over the pipeline consumed by external surfaces.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Store a document, register its job, and enqueue extraction.
    async fn submit_document(
        &self,
        original_name: &str,
        content: Vec<u8>,
    ) -> Result<SubmissionReceipt, PipelineError>;

    /// Fetch the current record for a job.
    async fn job_status(&self, job_id: &str) -> Result<JobRecord, PipelineError>;

    /// Fetch the summary text of a completed job.
    async fn job_summary(&self, job_id: &str) -> Result<String, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Coordinates the full document pipeline: submission, extraction, and summarization.
pub struct PipelineService {
    storage: Arc<dyn Storage>,
    registry: Arc<dyn Registry>,
    extraction_queue: Arc<dyn Queue>,
    summary_queue: Arc<dyn Queue>,
    extractor: Box<dyn Extractor>,
    summarizer: Box<dyn Summarizer>,
    metrics: Arc<PipelineMetrics>,
    extraction_wake: Notify,
    summary_wake: Notify,
    max_upload_bytes: usize,
}

impl PipelineService {
    /// Build a new pipeline service from configuration, initializing backends as needed.
    pub async fn new() -> Self {
        let config = get_config();
        tracing::info!(
            storage_backend = ?config.storage_backend,
            queue_backend = ?config.queue_backend,
            registry_backend = ?config.registry_backend,
            "Initializing pipeline components"
        );
        let storage = storage::get_storage().expect("Failed to initialize storage gateway");
        let registry = registry::get_registry().expect("Failed to initialize job registry");
        let extraction_queue = queue::get_queue(&config.extraction_queue_name)
            .await
            .expect("Failed to initialize extraction queue");
        let summary_queue = queue::get_queue(&config.summary_queue_name)
            .await
            .expect("Failed to initialize summarization queue");
        tracing::debug!("Pipeline components ready");

        Self::with_components(
            storage,
            registry,
            extraction_queue,
            summary_queue,
            stages::get_extractor(),
            stages::get_summarizer(),
            config.max_upload_bytes,
        )
    }

    /// Assemble a service from explicit components.
    pub fn with_components(
        storage: Arc<dyn Storage>,
        registry: Arc<dyn Registry>,
        extraction_queue: Arc<dyn Queue>,
        summary_queue: Arc<dyn Queue>,
        extractor: Box<dyn Extractor>,
        summarizer: Box<dyn Summarizer>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            storage,
            registry,
            extraction_queue,
            summary_queue,
            extractor,
            summarizer,
            metrics: Arc::new(PipelineMetrics::new()),
            extraction_wake: Notify::new(),
            summary_wake: Notify::new(),
            max_upload_bytes,
        }
    }

    /// Store a document, register its job, and enqueue the extraction message.
    ///
    /// The record is created before the message becomes observable so a worker never
    /// dequeues a job the registry does not know. If the enqueue itself fails, the
    /// record and the stored document are rolled back and the submission fails whole.
    pub async fn submit_document(
        &self,
        original_name: &str,
        content: Vec<u8>,
    ) -> Result<SubmissionReceipt, PipelineError> {
        let name = sanitize_filename(original_name);
        if !name.to_lowercase().ends_with(".pdf") {
            return Err(PipelineError::UnsupportedDocument(name));
        }
        if content.len() > self.max_upload_bytes {
            return Err(PipelineError::DocumentTooLarge {
                limit: self.max_upload_bytes,
            });
        }

        let job_id = Uuid::new_v4().to_string();
        let key = format!("documents/{job_id}/{name}");
        let location = self
            .storage
            .put(&key, &content, Some("application/pdf"))
            .await?;

        let record = JobRecord::new(job_id.clone(), location.to_string(), name.clone());
        self.registry.create(record).await?;

        let message = JobMessage {
            job_id: job_id.clone(),
            content_location: location.to_string(),
            original_name: Some(name),
        };
        if let Err(error) = self.extraction_queue.enqueue(message).await {
            self.roll_back_submission(&job_id, &location).await;
            return Err(error.into());
        }

        self.extraction_wake.notify_one();
        self.metrics.record_submission();
        tracing::info!(job_id = %job_id, bytes = content.len(), "Submission accepted");
        Ok(SubmissionReceipt {
            job_id,
            status: JobStatus::Uploaded,
        })
    }

    /// Erase the traces of a submission whose enqueue failed.
    async fn roll_back_submission(&self, job_id: &str, location: &Location) {
        if let Err(error) = self.registry.remove(job_id).await {
            tracing::warn!(job_id, error = %error, "Failed to roll back job record");
        }
        if let Err(error) = self.storage.delete(location).await {
            tracing::warn!(job_id, error = %error, "Failed to roll back stored document");
        }
    }

    /// Fetch the current record for a job.
    pub async fn job_status(&self, job_id: &str) -> Result<JobRecord, PipelineError> {
        Ok(self.registry.get(job_id).await?)
    }

    /// Fetch the summary text of a completed job.
    pub async fn job_summary(&self, job_id: &str) -> Result<String, PipelineError> {
        let record = self.registry.get(job_id).await?;
        let location = match (&record.status, &record.summary_location) {
            (JobStatus::Completed, Some(location)) => Location::new(location.clone()),
            _ => {
                return Err(PipelineError::SummaryNotReady {
                    job_id: job_id.to_string(),
                    status: record.status,
                });
            }
        };
        let content = self.storage.get(&location).await?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drain the extraction queue until it reports empty.
    pub async fn drain_extraction_queue(&self) {
        loop {
            match self.extraction_queue.dequeue().await {
                Ok(Some(message)) => self.process_extraction_message(message).await,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(error = %error, "Failed to poll extraction queue");
                    break;
                }
            }
        }
    }

    /// Drain the summarization queue until it reports empty.
    pub async fn drain_summary_queue(&self) {
        loop {
            match self.summary_queue.dequeue().await {
                Ok(Some(message)) => self.process_summary_message(message).await,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(error = %error, "Failed to poll summarization queue");
                    break;
                }
            }
        }
    }

    async fn process_extraction_message(&self, message: JobMessage) {
        match self.run_extraction(&message).await {
            Ok(StageOutcome::Advanced) => {}
            Ok(StageOutcome::Skipped(status)) => {
                tracing::debug!(job_id = %message.job_id, status = %status, "Dropped redundant extraction message");
            }
            Err(error) => {
                self.metrics.record_extraction_failure();
                self.fail_job(&message.job_id, JobStatus::OcrFailed, &error)
                    .await;
            }
        }
    }

    async fn process_summary_message(&self, message: JobMessage) {
        match self.run_summarization(&message).await {
            Ok(StageOutcome::Advanced) => {}
            Ok(StageOutcome::Skipped(status)) => {
                tracing::debug!(job_id = %message.job_id, status = %status, "Dropped redundant summarization message");
            }
            Err(error) => {
                self.metrics.record_summarization_failure();
                self.fail_job(&message.job_id, JobStatus::SummarizationFailed, &error)
                    .await;
            }
        }
    }

    /// Advance one job through the extraction stage.
    async fn run_extraction(&self, message: &JobMessage) -> Result<StageOutcome, StageError> {
        let job_id = &message.job_id;
        let record = self.registry.get(job_id).await?;
        match record.status {
            // `ocr_processing` covers redelivery after a crash mid-stage; re-running
            // rewrites identical artifacts.
            JobStatus::Uploaded | JobStatus::OcrProcessing => {}
            // Extraction already finished: the artifact exists, so only the follow-up
            // dispatch can be missing. Re-issue it without touching the status; the
            // summarization handler drops duplicates.
            JobStatus::OcrCompleted => {
                if let Some(text_location) = record.extracted_text_location {
                    self.summary_queue
                        .enqueue(JobMessage {
                            job_id: job_id.clone(),
                            content_location: text_location,
                            original_name: None,
                        })
                        .await?;
                    self.summary_wake.notify_one();
                    tracing::debug!(job_id = %job_id, "Re-dispatched summarization for redelivered message");
                    return Ok(StageOutcome::Advanced);
                }
            }
            status => return Ok(StageOutcome::Skipped(status)),
        }

        self.registry
            .update(job_id, JobStatus::OcrProcessing, JobUpdate::default())
            .await?;
        tracing::info!(job_id = %job_id, "Extraction started");

        let source = Location::new(record.source_location.clone());
        let scratch = self.storage.materialize_local(&source).await?;
        let text = self.extractor.extract(scratch.path()).await?;
        drop(scratch);

        let key = format!("text/{job_id}/extracted.txt");
        let text_location = self
            .storage
            .put(&key, text.as_bytes(), Some("text/plain"))
            .await?;
        self.registry
            .update(
                job_id,
                JobStatus::OcrCompleted,
                JobUpdate {
                    extracted_text_location: Some(text_location.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        self.summary_queue
            .enqueue(JobMessage {
                job_id: job_id.clone(),
                content_location: text_location.to_string(),
                original_name: None,
            })
            .await?;
        self.summary_wake.notify_one();

        tracing::info!(job_id = %job_id, chars = text.len(), "Extraction completed");
        Ok(StageOutcome::Advanced)
    }

    /// Advance one job through the summarization stage.
    async fn run_summarization(&self, message: &JobMessage) -> Result<StageOutcome, StageError> {
        let job_id = &message.job_id;
        let record = self.registry.get(job_id).await?;
        match record.status {
            JobStatus::OcrCompleted | JobStatus::Summarizing => {}
            status => return Ok(StageOutcome::Skipped(status)),
        }

        self.registry
            .update(job_id, JobStatus::Summarizing, JobUpdate::default())
            .await?;
        tracing::info!(job_id = %job_id, "Summarization started");

        let text_location = Location::new(message.content_location.clone());
        let content = self.storage.get(&text_location).await?;
        let text = String::from_utf8(content).map_err(|_| StageError::MalformedArtifact)?;
        let summary = self.summarizer.summarize(&text).await?;

        let key = format!("summary/{job_id}/summary.txt");
        let summary_location = self
            .storage
            .put(&key, summary.as_bytes(), Some("text/plain"))
            .await?;
        self.registry
            .update(
                job_id,
                JobStatus::Completed,
                JobUpdate {
                    summary_location: Some(summary_location.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        self.metrics.record_completion();
        tracing::info!(job_id = %job_id, chars = summary.len(), "Summarization completed");
        Ok(StageOutcome::Advanced)
    }

    /// Record a stage failure on the job and absorb the error.
    async fn fail_job(&self, job_id: &str, status: JobStatus, error: &StageError) {
        tracing::error!(job_id, status = %status, error = %error, "Stage failed");
        let update = JobUpdate {
            error_detail: Some(error.to_string()),
            ..Default::default()
        };
        if let Err(update_error) = self.registry.update(job_id, status, update).await {
            tracing::error!(job_id, error = %update_error, "Failed to record stage failure");
        }
    }

    pub(crate) fn wake_for(&self, stage: worker::Stage) -> &Notify {
        match stage {
            worker::Stage::Extraction => &self.extraction_wake,
            worker::Stage::Summarization => &self.summary_wake,
        }
    }
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn submit_document(
        &self,
        original_name: &str,
        content: Vec<u8>,
    ) -> Result<SubmissionReceipt, PipelineError> {
        PipelineService::submit_document(self, original_name, content).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobRecord, PipelineError> {
        PipelineService::job_status(self, job_id).await
    }

    async fn job_summary(&self, job_id: &str) -> Result<String, PipelineError> {
        PipelineService::job_summary(self, job_id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineService::metrics_snapshot(self)
    }
}

/// Normalize an uploaded filename into a safe artifact name.
///
/// Path separators and control characters collapse to underscores; leading dots are
/// dropped so the name cannot escape its container.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|character| match character {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => character,
            _ => '_',
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::sanitize_filename;

    #[test]
    fn sanitize_filename_replaces_path_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd.pdf"), "etc_passwd.pdf");
        assert_eq!(sanitize_filename("report 2024.pdf"), "report_2024.pdf");
        assert_eq!(sanitize_filename("Quarterly-Review_v2.pdf"), "Quarterly-Review_v2.pdf");
    }

    #[test]
    fn sanitize_filename_defaults_when_nothing_survives() {
        assert_eq!(sanitize_filename("..."), "document.pdf");
        assert_eq!(sanitize_filename(""), "document.pdf");
    }
}
