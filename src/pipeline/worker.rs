//! Fixed-size worker pools that drain the stage queues.
//!
//! Each stage gets a small pool of long-lived tasks instead of a new drain loop per
//! triggering event. A worker drains its queue until empty, then parks until either a
//! producer signals a fresh enqueue or the fallback polling interval elapses. The
//! polling fallback also picks up messages that reappear on a remote queue after their
//! visibility window lapses, where no in-process wake signal exists.

use super::PipelineService;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pipeline stage a worker is dedicated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Drains the extraction queue.
    Extraction,
    /// Drains the summarization queue.
    Summarization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extraction => f.write_str("extraction"),
            Self::Summarization => f.write_str("summarization"),
        }
    }
}

/// Spawn `workers_per_stage` workers for each stage queue.
///
/// The returned handles are detached by callers that run for the process lifetime; they
/// exist so tests can abort the pool.
pub fn spawn_workers(
    service: &Arc<PipelineService>,
    workers_per_stage: usize,
    poll_interval: Duration,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(workers_per_stage * 2);
    for index in 0..workers_per_stage {
        for stage in [Stage::Extraction, Stage::Summarization] {
            handles.push(tokio::spawn(run_worker(
                Arc::clone(service),
                stage,
                index,
                poll_interval,
            )));
        }
    }
    handles
}

async fn run_worker(
    service: Arc<PipelineService>,
    stage: Stage,
    index: usize,
    poll_interval: Duration,
) {
    tracing::debug!(stage = %stage, index, "Worker started");
    loop {
        match stage {
            Stage::Extraction => service.drain_extraction_queue().await,
            Stage::Summarization => service.drain_summary_queue().await,
        }

        let wake = service.wake_for(stage);
        tokio::select! {
            _ = wake.notified() => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
