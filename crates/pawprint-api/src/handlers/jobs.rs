use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
};
use pawprint_core::models::UploadJob;
use pawprint_core::AppError;
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// Get the status of an upload job
#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    tag = "jobs",
    params(("job_id" = Uuid, Path, description = "Job id returned by the upload")),
    responses(
        (status = 200, description = "Job found", body = UploadJob),
        (status = 404, description = "Job not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, HttpAppError> {
    let job = state.queue.get(job_id).await.map_err(|e| {
        tracing::error!(error = %e, job_id = %job_id, "Failed to load job");
        AppError::Internal(e.to_string())
    })?;

    match job {
        Some(job) => Ok(Json(serde_json::json!({ "data": job }))),
        None => Err(AppError::NotFound(format!("Job not found: {}", job_id)).into()),
    }
}
