//! Message queue abstraction for the stage pipelines.
//!
//! Each stage drains its own queue of [`JobMessage`]s. Delivery is at-least-once:
//! consumers must tolerate redelivery of a message they have already processed. The
//! local backend is a bounded in-process queue; the remote backend is a managed queue
//! service with visibility-timeout semantics.

/// Bounded in-process queue for local development.
pub mod memory;
/// HTTP client for a managed queue service.
pub mod remote;

pub use memory::InMemoryQueue;
pub use remote::RemoteQueue;

use crate::config::{BackendKind, get_config};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Message carried between pipeline stages.
///
/// Messages are immutable once enqueued and hold only what the next stage needs: the
/// job identifier and the location of the artifact to consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    /// Identifier of the job this message advances.
    pub job_id: String,
    /// Location of the artifact the next stage consumes.
    pub content_location: String,
    /// Display name of the original document, when the stage wants it for logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
}

/// Errors raised by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The bounded local queue cannot accept more messages.
    #[error("Queue is at capacity")]
    Full,
    /// A message body could not be encoded or decoded.
    #[error("Malformed queue message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Queue service responded with an unexpected status code.
    #[error("Unexpected queue service response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the queue service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Ordered, at-least-once delivery channel for stage messages.
///
/// `dequeue` never blocks: an empty queue yields `Ok(None)`. Implementations must be
/// safe for concurrent producers and consumers; two consumers never observe the same
/// message inside one visibility window.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Append a message, failing fast with [`QueueError::Full`] on a bounded backend.
    async fn enqueue(&self, message: JobMessage) -> Result<(), QueueError>;

    /// Take the next message, or `None` when the queue is empty.
    async fn dequeue(&self) -> Result<Option<JobMessage>, QueueError>;

    /// Whether the queue currently reports no messages.
    async fn is_empty(&self) -> Result<bool, QueueError>;

    /// Approximate number of messages currently queued.
    async fn size(&self) -> Result<usize, QueueError>;

    /// Drop every queued message.
    async fn purge(&self) -> Result<(), QueueError>;
}

/// Build the queue named `name` using the backend selected by configuration.
pub async fn get_queue(name: &str) -> Result<Arc<dyn Queue>, QueueError> {
    let config = get_config();
    match config.queue_backend {
        BackendKind::Local => Ok(Arc::new(InMemoryQueue::new(config.queue_capacity))),
        BackendKind::Remote => Ok(Arc::new(RemoteQueue::connect_from_config(name).await?)),
    }
}
