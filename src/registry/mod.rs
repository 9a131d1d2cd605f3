//! Job registry abstraction tracking each document's journey through the pipeline.
//!
//! Records are keyed by job identifier and mutated only by the orchestrator. Updates to
//! the same job apply atomically (a status transition and its accompanying field writes
//! land together); different jobs never contend.

/// In-memory registry for local development.
pub mod memory;
/// HTTP client for a managed table service.
pub mod table;

pub use memory::InMemoryRegistry;
pub use table::TableRegistry;

use crate::config::{BackendKind, get_config};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Lifecycle states of a job, serialized with the exact wire vocabulary exposed to
/// status-polling callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Document stored and extraction message enqueued.
    Uploaded,
    /// A worker is extracting text from the document.
    OcrProcessing,
    /// Text artifact written; summarization message enqueued.
    OcrCompleted,
    /// A worker is summarizing the extracted text.
    Summarizing,
    /// Summary artifact written; the job is done.
    Completed,
    /// Extraction failed; the pipeline halted for this job.
    OcrFailed,
    /// Summarization failed; the text artifact remains available.
    SummarizationFailed,
}

impl JobStatus {
    /// The wire string for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::OcrProcessing => "ocr_processing",
            Self::OcrCompleted => "ocr_completed",
            Self::Summarizing => "summarizing",
            Self::Completed => "completed",
            Self::OcrFailed => "ocr_failed",
            Self::SummarizationFailed => "summarization_failed",
        }
    }

    /// Whether no further automatic transition occurs from this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::OcrFailed | Self::SummarizationFailed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document's journey through extraction and summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Opaque, caller-unguessable job identifier.
    pub job_id: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Storage location of the original document.
    pub source_location: String,
    /// Display name of the uploaded document.
    pub original_name: String,
    /// Location of the extracted text, set once extraction succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text_location: Option<String>,
    /// Location of the summary, set once the job completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_location: Option<String>,
    /// Human-readable diagnostic recorded on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Unix timestamp of record creation.
    pub created_at: i64,
    /// Unix timestamp of the most recent update.
    pub updated_at: i64,
}

impl JobRecord {
    /// Build a fresh record in the `uploaded` state.
    pub fn new(job_id: String, source_location: String, original_name: String) -> Self {
        let now = unix_now();
        Self {
            job_id,
            status: JobStatus::Uploaded,
            source_location,
            original_name,
            extracted_text_location: None,
            summary_location: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field writes applied together with a status transition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobUpdate {
    /// New extracted-text location, when extraction succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text_location: Option<String>,
    /// New summary location, when summarization succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_location: Option<String>,
    /// Failure diagnostic, when a stage failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Errors raised by registry backends.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No record exists for the requested job identifier.
    #[error("Unknown job: {0}")]
    NotFound(String),
    /// A record for this job identifier already exists.
    #[error("Job already registered: {0}")]
    AlreadyExists(String),
    /// A record could not be encoded or decoded.
    #[error("Malformed job record: {0}")]
    Malformed(#[from] serde_json::Error),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Table service responded with an unexpected status code.
    #[error("Unexpected table service response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the table service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Key-value store of job records, keyed by job identifier.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Insert a new record; each job is created exactly once.
    async fn create(&self, record: JobRecord) -> Result<(), RegistryError>;

    /// Fetch the record for `job_id`.
    async fn get(&self, job_id: &str) -> Result<JobRecord, RegistryError>;

    /// Apply a status transition and its accompanying field writes atomically.
    async fn update(
        &self,
        job_id: &str,
        status: JobStatus,
        fields: JobUpdate,
    ) -> Result<(), RegistryError>;

    /// Remove a record left behind by a submission whose enqueue failed.
    ///
    /// Live jobs are never deleted by the pipeline; this exists solely so a rejected
    /// submission leaves no trace.
    async fn remove(&self, job_id: &str) -> Result<(), RegistryError>;
}

/// Current unix timestamp used for record bookkeeping.
pub(crate) fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Build the registry selected by configuration.
pub fn get_registry() -> Result<Arc<dyn Registry>, RegistryError> {
    let config = get_config();
    match config.registry_backend {
        BackendKind::Local => Ok(Arc::new(InMemoryRegistry::new())),
        BackendKind::Remote => Ok(Arc::new(TableRegistry::from_config()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_to_wire_vocabulary() {
        let pairs = [
            (JobStatus::Uploaded, "uploaded"),
            (JobStatus::OcrProcessing, "ocr_processing"),
            (JobStatus::OcrCompleted, "ocr_completed"),
            (JobStatus::Summarizing, "summarizing"),
            (JobStatus::Completed, "completed"),
            (JobStatus::OcrFailed, "ocr_failed"),
            (JobStatus::SummarizationFailed, "summarization_failed"),
        ];
        for (status, wire) in pairs {
            assert_eq!(serde_json::json!(status), serde_json::json!(wire));
            assert_eq!(status.as_str(), wire);
        }
    }

    #[test]
    fn terminal_states_are_exactly_the_three_documented() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::OcrFailed.is_terminal());
        assert!(JobStatus::SummarizationFailed.is_terminal());
        assert!(!JobStatus::Uploaded.is_terminal());
        assert!(!JobStatus::OcrProcessing.is_terminal());
        assert!(!JobStatus::OcrCompleted.is_terminal());
        assert!(!JobStatus::Summarizing.is_terminal());
    }

    #[test]
    fn new_records_start_uploaded_with_no_artifacts() {
        let record = JobRecord::new(
            "job-1".into(),
            "/data/documents/job-1/a.pdf".into(),
            "a.pdf".into(),
        );
        assert_eq!(record.status, JobStatus::Uploaded);
        assert!(record.extracted_text_location.is_none());
        assert!(record.summary_location.is_none());
        assert!(record.error_detail.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }
}
