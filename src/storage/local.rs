//! Filesystem implementation of the storage gateway.

use super::{Location, ScratchFile, Storage, StorageError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Storage gateway backed by a directory on the local filesystem.
///
/// Keys map directly onto paths below the configured root, so the
/// `{stage}/{job_id}/{artifact_name}` hierarchy becomes nested directories.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a gateway rooted at `root`. The directory is created lazily by `put`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &Location) -> Result<PathBuf, StorageError> {
        if location.is_remote() {
            return Err(StorageError::InvalidLocation(location.as_str().to_string()));
        }
        Ok(PathBuf::from(location.as_str()))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(
        &self,
        key: &str,
        content: &[u8],
        _content_type: Option<&str>,
    ) -> Result<Location, StorageError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "Stored artifact");
        Ok(Location::new(path.to_string_lossy().into_owned()))
    }

    async fn get(&self, location: &Location) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(location)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(location.as_str().to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn delete(&self, location: &Location) -> Result<bool, StorageError> {
        let path = self.resolve(location)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn materialize_local(&self, location: &Location) -> Result<ScratchFile, StorageError> {
        let path = self.resolve(location)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(location.as_str().to_string()));
        }
        // Content already lives on disk; borrow it in place.
        Ok(ScratchFile::borrowed(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use uuid::Uuid;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("docpipe-local-storage-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let root = scratch_root();
        let storage = LocalStorage::new(&root);

        let location = storage
            .put("documents/job-1/a.pdf", b"content", Some("application/pdf"))
            .await
            .expect("put succeeds");
        assert!(!location.is_remote());

        let content = storage.get(&location).await.expect("get succeeds");
        assert_eq!(content, b"content");

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn put_creates_missing_directories() {
        let root = scratch_root();
        let storage = LocalStorage::new(&root);

        let location = storage
            .put("summary/job-2/summary.txt", b"short", None)
            .await
            .expect("put succeeds");
        assert!(Path::new(location.as_str()).starts_with(&root));

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn get_missing_content_reports_not_found() {
        let root = scratch_root();
        let storage = LocalStorage::new(&root);
        let missing = Location::new(root.join("text/nope.txt").to_string_lossy().into_owned());

        let error = storage.get(&missing).await.unwrap_err();
        assert!(matches!(error, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_reports_whether_content_existed() {
        let root = scratch_root();
        let storage = LocalStorage::new(&root);

        let location = storage
            .put("text/job-3/extracted.txt", b"text", None)
            .await
            .expect("put succeeds");
        assert!(storage.delete(&location).await.expect("delete succeeds"));
        assert!(!storage.delete(&location).await.expect("second delete succeeds"));

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn materialize_borrows_local_content_in_place() {
        let root = scratch_root();
        let storage = LocalStorage::new(&root);

        let location = storage
            .put("documents/job-4/a.pdf", b"%PDF-1.4", None)
            .await
            .expect("put succeeds");

        let path = {
            let scratch = storage
                .materialize_local(&location)
                .await
                .expect("materialize succeeds");
            scratch.path().to_path_buf()
        };
        // Dropping a borrowed scratch handle must not delete the original.
        assert!(path.exists());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn remote_locations_are_rejected() {
        let storage = LocalStorage::new(scratch_root());
        let remote = Location::remote("bucket", "key");
        let error = storage.get(&remote).await.unwrap_err();
        assert!(matches!(error, StorageError::InvalidLocation(_)));
    }
}
