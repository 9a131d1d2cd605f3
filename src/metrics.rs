use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    jobs_submitted: AtomicU64,
    jobs_completed: AtomicU64,
    extractions_failed: AtomicU64,
    summarizations_failed: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted submission.
    pub fn record_submission(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job that reached the `completed` state.
    pub fn record_completion(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job that terminated in `ocr_failed`.
    pub fn record_extraction_failure(&self) {
        self.extractions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job that terminated in `summarization_failed`.
    pub fn record_summarization_failure(&self) {
        self.summarizations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            extractions_failed: self.extractions_failed.load(Ordering::Relaxed),
            summarizations_failed: self.summarizations_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of submissions accepted since startup.
    pub jobs_submitted: u64,
    /// Number of jobs that reached `completed` since startup.
    pub jobs_completed: u64,
    /// Number of jobs that terminated in `ocr_failed`.
    pub extractions_failed: u64,
    /// Number of jobs that terminated in `summarization_failed`.
    pub summarizations_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_submissions_and_outcomes() {
        let metrics = PipelineMetrics::new();
        metrics.record_submission();
        metrics.record_submission();
        metrics.record_completion();
        metrics.record_extraction_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 2);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.extractions_failed, 1);
        assert_eq!(snapshot.summarizations_failed, 0);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = PipelineMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 0);
        assert_eq!(snapshot.jobs_completed, 0);
    }
}
