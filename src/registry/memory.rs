//! In-memory registry used in local development.

use super::{JobRecord, JobStatus, JobUpdate, Registry, RegistryError, unix_now};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Registry holding records in a process-local map.
///
/// A single registry-wide lock guards mutation; per-job atomicity follows because an
/// update holds the write guard for the whole transition.
#[derive(Default)]
pub struct InMemoryRegistry {
    inner: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn create(&self, record: JobRecord) -> Result<(), RegistryError> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(&record.job_id) {
            return Err(RegistryError::AlreadyExists(record.job_id));
        }
        guard.insert(record.job_id.clone(), record);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<JobRecord, RegistryError> {
        self.inner
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))
    }

    async fn update(
        &self,
        job_id: &str,
        status: JobStatus,
        fields: JobUpdate,
    ) -> Result<(), RegistryError> {
        let mut guard = self.inner.write().await;
        let record = guard
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?;
        record.status = status;
        if let Some(location) = fields.extracted_text_location {
            record.extracted_text_location = Some(location);
        }
        if let Some(location) = fields.summary_location {
            record.summary_location = Some(location);
        }
        if let Some(detail) = fields.error_detail {
            record.error_detail = Some(detail);
        }
        record.updated_at = unix_now();
        Ok(())
    }

    async fn remove(&self, job_id: &str) -> Result<(), RegistryError> {
        self.inner
            .write()
            .await
            .remove(job_id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))
    }
}
