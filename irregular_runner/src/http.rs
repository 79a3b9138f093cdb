use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use irregular_models::job::{
    CreateJobRequest, JobDeleted, JobResponse, JobSummary, UpdateJobRequest,
};
use serde_json::json;

use crate::{error::JobError, manager::JobManagerHandle};

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let status = match &self {
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::AlreadyExists(_) => StatusCode::CONFLICT,
            JobError::Storage(_) | JobError::ManagerStopped => {
                log::error!("[RUNNER] Request failed. [error = {:#}]", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(manager: JobManagerHandle) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/{id}", patch(update_job).delete(delete_job))
        .route("/jobs/{id}/pause", post(pause_job))
        .route("/jobs/{id}/resume", post(resume_job))
        .with_state(manager)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "service": "irregular_runner", "status": "ok" }))
}

async fn create_job(
    State(manager): State<JobManagerHandle>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), JobError> {
    let created = manager.create_job(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_job(
    State(manager): State<JobManagerHandle>,
    Path(id): Path<String>,
    Json(request): Json<UpdateJobRequest>,
) -> Result<Json<JobResponse>, JobError> {
    Ok(Json(manager.update_job(id, request).await?))
}

async fn pause_job(
    State(manager): State<JobManagerHandle>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, JobError> {
    Ok(Json(manager.pause_job(id).await?))
}

async fn resume_job(
    State(manager): State<JobManagerHandle>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, JobError> {
    Ok(Json(manager.resume_job(id).await?))
}

async fn delete_job(
    State(manager): State<JobManagerHandle>,
    Path(id): Path<String>,
) -> Result<Json<JobDeleted>, JobError> {
    Ok(Json(manager.delete_job(id).await?))
}

async fn list_jobs(
    State(manager): State<JobManagerHandle>,
) -> Result<Json<Vec<JobSummary>>, JobError> {
    Ok(Json(manager.list_jobs().await?))
}
