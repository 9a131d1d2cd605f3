//! HTTP client for a managed table service.
//!
//! Records live as JSON items keyed by job identifier:
//!
//! - `PUT /tables/{table}/items/{job_id}?if_not_exists=true` creates an item, answering
//!   `409 Conflict` when it already exists.
//! - `GET /tables/{table}/items/{job_id}` fetches an item.
//! - `PATCH /tables/{table}/items/{job_id}` merges the supplied fields into the item;
//!   the service applies the merge atomically, which is what carries the registry's
//!   per-job atomic-update contract.
//! - `DELETE /tables/{table}/items/{job_id}` removes an item.

use super::{JobRecord, JobStatus, JobUpdate, Registry, RegistryError, unix_now};
use crate::config::get_config;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};

/// Registry backed by a remote table service.
pub struct TableRegistry {
    client: Client,
    base_url: String,
    table: String,
    api_key: Option<String>,
}

impl TableRegistry {
    /// Construct a client for the service at `base_url`, using table `table`.
    pub fn new(
        base_url: &str,
        table: &str,
        api_key: Option<String>,
    ) -> Result<Self, RegistryError> {
        let client = Client::builder().user_agent("docpipe/0.1").build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            api_key,
        })
    }

    /// Construct a client using configuration derived from the environment.
    pub fn from_config() -> Result<Self, RegistryError> {
        let config = get_config();
        let base_url = config.table_service_url.as_deref().unwrap_or_default();
        Self::new(base_url, &config.table_name, config.table_api_key.clone())
    }

    fn endpoint(&self, job_id: &str) -> String {
        format!("{}/tables/{}/items/{job_id}", self.base_url, self.table)
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("api-key", api_key);
        }
        builder
    }

    async fn unexpected_status(response: reqwest::Response) -> RegistryError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        RegistryError::UnexpectedStatus { status, body }
    }
}

#[async_trait]
impl Registry for TableRegistry {
    async fn create(&self, record: JobRecord) -> Result<(), RegistryError> {
        let job_id = record.job_id.clone();
        let response = self
            .request(Method::PUT, self.endpoint(&job_id))
            .query(&[("if_not_exists", "true")])
            .json(&record)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::CONFLICT {
            Err(RegistryError::AlreadyExists(job_id))
        } else {
            Err(Self::unexpected_status(response).await)
        }
    }

    async fn get(&self, job_id: &str) -> Result<JobRecord, RegistryError> {
        let response = self
            .request(Method::GET, self.endpoint(job_id))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            let value: Value = response.json().await?;
            Ok(serde_json::from_value(value)?)
        } else if status == StatusCode::NOT_FOUND {
            Err(RegistryError::NotFound(job_id.to_string()))
        } else {
            Err(Self::unexpected_status(response).await)
        }
    }

    async fn update(
        &self,
        job_id: &str,
        status: JobStatus,
        fields: JobUpdate,
    ) -> Result<(), RegistryError> {
        let mut merge = Map::new();
        merge.insert("status".into(), json!(status));
        merge.insert("updated_at".into(), json!(unix_now()));
        if let Value::Object(extra) = serde_json::to_value(&fields)? {
            merge.extend(extra);
        }

        let response = self
            .request(Method::PATCH, self.endpoint(job_id))
            .json(&Value::Object(merge))
            .send()
            .await?;
        let status_code = response.status();
        if status_code.is_success() {
            Ok(())
        } else if status_code == StatusCode::NOT_FOUND {
            Err(RegistryError::NotFound(job_id.to_string()))
        } else {
            Err(Self::unexpected_status(response).await)
        }
    }

    async fn remove(&self, job_id: &str) -> Result<(), RegistryError> {
        let response = self
            .request(Method::DELETE, self.endpoint(job_id))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            Err(RegistryError::NotFound(job_id.to_string()))
        } else {
            Err(Self::unexpected_status(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::PATCH, Method::PUT, MockServer};

    fn registry_for(server: &MockServer) -> TableRegistry {
        TableRegistry::new(&server.base_url(), "docpipe-jobs", None).expect("client builds")
    }

    fn record() -> JobRecord {
        JobRecord::new(
            "job-1".to_string(),
            "store://artifacts/documents/job-1/a.pdf".to_string(),
            "a.pdf".to_string(),
        )
    }

    #[tokio::test]
    async fn create_puts_item_conditionally() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/tables/docpipe-jobs/items/job-1")
                    .query_param("if_not_exists", "true")
                    .body_contains("uploaded");
                then.status(201);
            })
            .await;

        registry_for(&server).create(record()).await.expect("create");
        mock.assert();
    }

    #[tokio::test]
    async fn create_conflict_reports_already_exists() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/tables/docpipe-jobs/items/job-1");
                then.status(409);
            })
            .await;

        let error = registry_for(&server).create(record()).await.unwrap_err();
        assert!(matches!(error, RegistryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn get_parses_stored_record() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tables/docpipe-jobs/items/job-1");
                then.status(200).json_body(serde_json::json!({
                    "job_id": "job-1",
                    "status": "ocr_completed",
                    "source_location": "store://artifacts/documents/job-1/a.pdf",
                    "original_name": "a.pdf",
                    "extracted_text_location": "store://artifacts/text/job-1/extracted.txt",
                    "created_at": 1754000000,
                    "updated_at": 1754000060,
                }));
            })
            .await;

        let fetched = registry_for(&server).get("job-1").await.expect("get");
        assert_eq!(fetched.status, JobStatus::OcrCompleted);
        assert_eq!(
            fetched.extracted_text_location.as_deref(),
            Some("store://artifacts/text/job-1/extracted.txt")
        );
    }

    #[tokio::test]
    async fn get_missing_item_reports_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tables/docpipe-jobs/items/missing");
                then.status(404);
            })
            .await;

        let error = registry_for(&server).get("missing").await.unwrap_err();
        assert!(matches!(error, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_patches_status_and_fields_in_one_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/tables/docpipe-jobs/items/job-1")
                    .body_contains("summarization_failed")
                    .body_contains("provider unavailable");
                then.status(200);
            })
            .await;

        registry_for(&server)
            .update(
                "job-1",
                JobStatus::SummarizationFailed,
                JobUpdate {
                    error_detail: Some("provider unavailable".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        mock.assert();
    }
}
