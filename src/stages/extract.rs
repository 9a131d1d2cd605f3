//! Default extraction stage over PDF documents.

use super::{ExtractionError, Extractor};
use async_trait::async_trait;
use lopdf::Document;
use std::path::{Path, PathBuf};

/// Extractor reading the embedded text layer of a PDF.
///
/// Parsing runs on the blocking thread pool so a large document does not stall the
/// worker's executor thread.
pub struct PdfExtractor;

impl PdfExtractor {
    /// Create a new extractor instance.
    pub const fn new() -> Self {
        Self
    }

    fn extract_sync(path: &Path) -> Result<String, ExtractionError> {
        let document = Document::load(path)
            .map_err(|error| ExtractionError::Unreadable(error.to_string()))?;
        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        let text = document
            .extract_text(&pages)
            .map_err(|error| ExtractionError::Unreadable(error.to_string()))?;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }
        Ok(trimmed.to_string())
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let path: PathBuf = path.to_path_buf();
        tracing::debug!(path = %path.display(), "Extracting document text");
        tokio::task::spawn_blocking(move || Self::extract_sync(&path))
            .await
            .map_err(|error| ExtractionError::Unreadable(error.to_string()))?
    }
}

/// Build the extractor used by the default pipeline wiring.
pub fn get_extractor() -> Box<dyn Extractor> {
    Box::new(PdfExtractor::new())
}
