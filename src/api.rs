//! HTTP surface for the docpipe server.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /documents` – Upload a PDF as `multipart/form-data` (field `file`). The
//!   document is stored, a job record is created, and extraction is enqueued; the
//!   response carries the job identifier and its initial status.
//! - `GET /jobs/{job_id}` – Current job record, including status, artifact locations,
//!   and any failure diagnostic.
//! - `GET /jobs/{job_id}/summary` – Summary text once the job has completed.
//! - `GET /metrics` – Observe pipeline throughput counters.
//!
//! The HTTP surface shares the pipeline service with the stage worker pools, so a
//! status poll observes exactly the state the workers write.

use crate::metrics::MetricsSnapshot;
use crate::pipeline::{PipelineApi, PipelineError, SubmissionReceipt};
use crate::registry::{JobRecord, JobStatus};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Generous request ceiling; the per-document budget is enforced by the service.
const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the pipeline API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/documents", post(submit_document::<S>))
        .route("/jobs/:job_id", get(job_status::<S>))
        .route("/jobs/:job_id/summary", get(job_summary::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .with_state(service)
}

/// Success response for the `POST /documents` endpoint.
#[derive(Serialize)]
struct SubmitResponse {
    /// Identifier assigned to the new job; poll `GET /jobs/{job_id}` with it.
    job_id: String,
    /// Initial job status (always `uploaded`).
    status: JobStatus,
}

/// Accept a document upload and start its pipeline.
async fn submit_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError>
where
    S: PipelineApi,
{
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::InvalidUpload(error.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("document.pdf").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|error| AppError::InvalidUpload(error.to_string()))?;
        upload = Some((name, bytes.to_vec()));
        break;
    }

    let Some((name, content)) = upload else {
        return Err(AppError::InvalidUpload(
            "multipart field 'file' is required".to_string(),
        ));
    };

    let SubmissionReceipt { job_id, status } = service.submit_document(&name, content).await?;
    tracing::info!(job_id = %job_id, "Upload accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse { job_id, status }),
    ))
}

/// Return the full job record for status polling.
async fn job_status<S>(
    State(service): State<Arc<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobRecord>, AppError>
where
    S: PipelineApi,
{
    let record = service.job_status(&job_id).await?;
    Ok(Json(record))
}

/// Response body for `GET /jobs/{job_id}/summary`.
#[derive(Serialize)]
struct SummaryResponse {
    summary: String,
}

/// Return the summary text of a completed job.
async fn job_summary<S>(
    State(service): State<Arc<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<SummaryResponse>, AppError>
where
    S: PipelineApi,
{
    let summary = service.job_summary(&job_id).await?;
    Ok(Json(SummaryResponse { summary }))
}

/// Return a concise snapshot of pipeline throughput counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

/// Error envelope translating pipeline failures into HTTP responses.
enum AppError {
    Pipeline(PipelineError),
    InvalidUpload(String),
}

impl From<PipelineError> for AppError {
    fn from(error: PipelineError) -> Self {
        Self::Pipeline(error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidUpload(message) => (StatusCode::BAD_REQUEST, message),
            Self::Pipeline(error) => {
                let status = match &error {
                    PipelineError::JobNotFound(_) => StatusCode::NOT_FOUND,
                    PipelineError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
                    PipelineError::UnsupportedDocument(_) => StatusCode::BAD_REQUEST,
                    PipelineError::DocumentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    PipelineError::SummaryNotReady { .. } => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
