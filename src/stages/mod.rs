//! Stage function contracts consumed by the pipeline orchestrator.
//!
//! Each stage is a pure function from the orchestrator's point of view: extraction turns
//! a local document into text, summarization turns text into a summary. Failures are
//! reported as explicit errors; a stage that can fall back to a degraded result reports
//! success instead.

/// PDF text extraction stage.
pub mod extract;
/// Summarization stage.
pub mod summarize;

pub use extract::{PdfExtractor, get_extractor};
pub use summarize::{ChatSummarizer, get_summarizer};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors raised by the extraction stage.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The document could not be opened or parsed.
    #[error("Failed to read document: {0}")]
    Unreadable(String),
    /// Parsing succeeded but the document yielded no text.
    #[error("Document produced no extractable text")]
    EmptyDocument,
}

/// Errors raised by the summarization stage.
#[derive(Debug, Error)]
pub enum SummarizationError {
    /// The summarization provider could not be reached.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The provider responded but produced no usable summary.
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
}

/// Text extraction over a locally materialized document.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract the text content of the document at `path`.
    ///
    /// Must not write artifacts on failure; the orchestrator persists the result.
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Summary generation over previously extracted text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a summary of `text`, bounding internally how much input is considered.
    async fn summarize(&self, text: &str) -> Result<String, SummarizationError>;
}
