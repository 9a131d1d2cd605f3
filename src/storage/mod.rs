//! Storage gateway abstraction over local-disk and object-store backends.
//!
//! Every artifact the pipeline touches is addressed by an opaque [`Location`]. Stage code
//! reads and writes content through the [`Storage`] trait without knowing which backend a
//! location resolves to; the backend is picked once at startup from configuration.
//! Artifact keys follow a `{stage}/{job_id}/{artifact_name}` hierarchy regardless of
//! backend, so the same key scheme maps onto a filesystem path or an object-store key.

/// Filesystem-backed storage for local development.
pub mod local;
/// HTTP object-store client for remote deployments.
pub mod object;

pub use local::LocalStorage;
pub use object::ObjectStore;

use crate::config::{BackendKind, get_config};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Scheme prefix marking object-store locations.
pub(crate) const REMOTE_SCHEME: &str = "store://";

/// Opaque address of a stored artifact, resolvable by the storage gateway.
///
/// Local content is addressed by its filesystem path; object-store content by a
/// `store://{bucket}/{key}` URI. Callers treat the value as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    /// Wrap a raw location string produced by an earlier `put`.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build an object-store location from its bucket and key.
    pub(crate) fn remote(bucket: &str, key: &str) -> Self {
        Self(format!("{REMOTE_SCHEME}{bucket}/{key}"))
    }

    /// View the location as its raw string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this location points into the object store.
    pub fn is_remote(&self) -> bool {
        self.0.starts_with(REMOTE_SCHEME)
    }

    /// Split an object-store location into its bucket and key.
    pub(crate) fn split_remote(&self) -> Result<(&str, &str), StorageError> {
        let rest = self
            .0
            .strip_prefix(REMOTE_SCHEME)
            .ok_or_else(|| StorageError::InvalidLocation(self.0.clone()))?;
        rest.split_once('/')
            .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
            .ok_or_else(|| StorageError::InvalidLocation(self.0.clone()))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised by the storage gateway.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No content exists at the requested location.
    #[error("No content stored at {0}")]
    NotFound(String),
    /// The location string cannot be resolved by this backend.
    #[error("Unresolvable content location: {0}")]
    InvalidLocation(String),
    /// Local filesystem operation failed.
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Object store responded with an unexpected status code.
    #[error("Unexpected object store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the object store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Local handle to materialized content, released when dropped.
///
/// `materialize_local` on a remote location downloads the content into a scratch file and
/// returns an owned guard; dropping the guard removes the file on every exit path,
/// including when a stage function fails. Content that is already local is borrowed in
/// place and left untouched on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    owned: bool,
}

impl ScratchFile {
    pub(crate) fn borrowed(path: PathBuf) -> Self {
        Self { path, owned: false }
    }

    pub(crate) fn owned(path: PathBuf) -> Self {
        Self { path, owned: true }
    }

    /// Path to the local copy of the content.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        if let Err(error) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %error, "Failed to remove scratch file");
        }
    }
}

/// Uniform read/write/delete operations over byte content addressed by [`Location`].
///
/// All operations perform I/O and none retry automatically; retry policy belongs to the
/// caller. `content_type` hints are advisory and never required for correctness.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist `content` under the hierarchical `key`, creating missing containers.
    async fn put(
        &self,
        key: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<Location, StorageError>;

    /// Fetch the content stored at `location`.
    async fn get(&self, location: &Location) -> Result<Vec<u8>, StorageError>;

    /// Remove the content at `location`; returns `false` when nothing was stored there.
    async fn delete(&self, location: &Location) -> Result<bool, StorageError>;

    /// Produce a local path for the content, fetching into a scratch file if needed.
    async fn materialize_local(&self, location: &Location) -> Result<ScratchFile, StorageError>;
}

/// Build the storage gateway selected by configuration.
pub fn get_storage() -> Result<Arc<dyn Storage>, StorageError> {
    let config = get_config();
    match config.storage_backend {
        BackendKind::Local => Ok(Arc::new(LocalStorage::new(&config.data_dir))),
        BackendKind::Remote => Ok(Arc::new(ObjectStore::from_config()?)),
    }
}
