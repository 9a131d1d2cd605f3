//! HTTP client implementation of the storage gateway against an object store.
//!
//! The client speaks a plain path-style REST protocol: `PUT /{bucket}/{key}` stores an
//! object, `GET` fetches it, `DELETE` removes it. An optional `api-key` header carries
//! credentials. Buckets are created implicitly by the store on first write, which keeps
//! `put` free of any ensure-container round trip.

use super::{Location, ScratchFile, Storage, StorageError};
use crate::config::get_config;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Storage gateway backed by a remote object store.
pub struct ObjectStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) bucket: String,
    pub(crate) api_key: Option<String>,
    pub(crate) scratch_dir: PathBuf,
}

impl ObjectStore {
    /// Construct a client for the store at `base_url`, writing into `bucket`.
    pub fn new(
        base_url: &str,
        bucket: &str,
        api_key: Option<String>,
        scratch_dir: PathBuf,
    ) -> Result<Self, StorageError> {
        let client = Client::builder().user_agent("docpipe/0.1").build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            api_key,
            scratch_dir,
        })
    }

    /// Construct a client using configuration derived from the environment.
    pub fn from_config() -> Result<Self, StorageError> {
        let config = get_config();
        let base_url = config
            .object_store_url
            .as_deref()
            .ok_or_else(|| StorageError::InvalidLocation("OBJECT_STORE_URL is not set".into()))?;
        let scratch_dir = config
            .scratch_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("docpipe"));
        Self::new(
            base_url,
            &config.object_store_bucket,
            config.object_store_api_key.clone(),
            scratch_dir,
        )
    }

    fn endpoint(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.base_url)
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("api-key", api_key);
        }
        builder
    }

    async fn unexpected_status(response: reqwest::Response) -> StorageError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StorageError::UnexpectedStatus { status, body }
    }

    /// Deterministic scratch path for a location, keeping the original extension.
    fn scratch_path(&self, location: &Location) -> PathBuf {
        let digest = Sha256::digest(location.as_str().as_bytes());
        let mut name = hex::encode(digest);
        if let Some(extension) = Path::new(location.as_str())
            .extension()
            .and_then(|ext| ext.to_str())
        {
            name.push('.');
            name.push_str(extension);
        }
        self.scratch_dir.join(name)
    }
}

#[async_trait]
impl Storage for ObjectStore {
    async fn put(
        &self,
        key: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<Location, StorageError> {
        let mut builder = self
            .request(Method::PUT, self.endpoint(&self.bucket, key))
            .body(content.to_vec());
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Self::unexpected_status(response).await);
        }
        tracing::debug!(bucket = %self.bucket, key, bytes = content.len(), "Stored object");
        Ok(Location::remote(&self.bucket, key))
    }

    async fn get(&self, location: &Location) -> Result<Vec<u8>, StorageError> {
        // Locations written before a backend switch may still point at local paths.
        if !location.is_remote() {
            return match tokio::fs::read(location.as_str()).await {
                Ok(content) => Ok(content),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    Err(StorageError::NotFound(location.as_str().to_string()))
                }
                Err(error) => Err(error.into()),
            };
        }

        let (bucket, key) = location.split_remote()?;
        let response = self
            .request(Method::GET, self.endpoint(bucket, key))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.bytes().await?.to_vec())
        } else if status == StatusCode::NOT_FOUND {
            Err(StorageError::NotFound(location.as_str().to_string()))
        } else {
            Err(Self::unexpected_status(response).await)
        }
    }

    async fn delete(&self, location: &Location) -> Result<bool, StorageError> {
        if !location.is_remote() {
            return match tokio::fs::remove_file(location.as_str()).await {
                Ok(()) => Ok(true),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(error) => Err(error.into()),
            };
        }

        let (bucket, key) = location.split_remote()?;
        let response = self
            .request(Method::DELETE, self.endpoint(bucket, key))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(Self::unexpected_status(response).await)
        }
    }

    async fn materialize_local(&self, location: &Location) -> Result<ScratchFile, StorageError> {
        if !location.is_remote() {
            if !tokio::fs::try_exists(location.as_str()).await? {
                return Err(StorageError::NotFound(location.as_str().to_string()));
            }
            return Ok(ScratchFile::borrowed(PathBuf::from(location.as_str())));
        }

        let content = self.get(location).await?;
        let path = self.scratch_path(location);
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        tokio::fs::write(&path, &content).await?;
        tracing::debug!(location = %location, path = %path.display(), "Materialized scratch copy");
        Ok(ScratchFile::owned(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::DELETE, Method::GET, Method::PUT, MockServer};
    use uuid::Uuid;

    fn store_for(server: &MockServer) -> ObjectStore {
        ObjectStore::new(
            &server.base_url(),
            "artifacts",
            Some("secret".into()),
            std::env::temp_dir().join(format!("docpipe-object-test-{}", Uuid::new_v4())),
        )
        .expect("client builds")
    }

    #[tokio::test]
    async fn put_emits_expected_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/artifacts/text/job-1/extracted.txt")
                    .header("api-key", "secret")
                    .header("content-type", "text/plain")
                    .body("hello");
                then.status(200);
            })
            .await;

        let store = store_for(&server);
        let location = store
            .put("text/job-1/extracted.txt", b"hello", Some("text/plain"))
            .await
            .expect("put succeeds");

        mock.assert();
        assert_eq!(location.as_str(), "store://artifacts/text/job-1/extracted.txt");
    }

    #[tokio::test]
    async fn get_maps_missing_objects_to_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/artifacts/text/gone.txt");
                then.status(404);
            })
            .await;

        let store = store_for(&server);
        let error = store
            .get(&Location::remote("artifacts", "text/gone.txt"))
            .await
            .unwrap_err();
        assert!(matches!(error, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_reports_whether_object_existed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/artifacts/old/a.pdf");
                then.status(204);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/artifacts/old/b.pdf");
                then.status(404);
            })
            .await;

        let store = store_for(&server);
        assert!(store
            .delete(&Location::remote("artifacts", "old/a.pdf"))
            .await
            .expect("delete succeeds"));
        assert!(!store
            .delete(&Location::remote("artifacts", "old/b.pdf"))
            .await
            .expect("delete succeeds"));
    }

    #[tokio::test]
    async fn materialize_downloads_and_cleans_up_scratch_copy() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/artifacts/documents/job-9/a.pdf");
                then.status(200).body("%PDF-1.4 test");
            })
            .await;

        let store = store_for(&server);
        let location = Location::remote("artifacts", "documents/job-9/a.pdf");
        let path = {
            let scratch = store
                .materialize_local(&location)
                .await
                .expect("materialize succeeds");
            assert_eq!(
                std::fs::read(scratch.path()).expect("scratch readable"),
                b"%PDF-1.4 test"
            );
            scratch.path().to_path_buf()
        };
        // Owned scratch copies are removed once the guard drops.
        assert!(!path.exists());
    }
}
