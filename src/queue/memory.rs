//! Bounded in-process queue used in local development.

use super::{JobMessage, Queue, QueueError};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// FIFO queue with a fixed capacity, shared across worker tasks.
///
/// `enqueue` on a full queue fails fast instead of blocking so that producers can
/// surface the condition as a submission failure.
pub struct InMemoryQueue {
    inner: Mutex<VecDeque<JobMessage>>,
    capacity: usize,
}

impl InMemoryQueue {
    /// Create an empty queue holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
        }
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, message: JobMessage) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().await;
        if guard.len() >= self.capacity {
            return Err(QueueError::Full);
        }
        guard.push_back(message);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<JobMessage>, QueueError> {
        Ok(self.inner.lock().await.pop_front())
    }

    async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.inner.lock().await.is_empty())
    }

    async fn size(&self) -> Result<usize, QueueError> {
        Ok(self.inner.lock().await.len())
    }

    async fn purge(&self) -> Result<(), QueueError> {
        self.inner.lock().await.clear();
        Ok(())
    }
}
