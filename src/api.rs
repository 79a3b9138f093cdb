//! HTTP surface of the reminder service.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{NaiveDateTime, NaiveTime};
use irregular_models::{
    distribution::{DistributionKind, DistributionParams},
    duration::ReminderDuration,
    error::ReminderError,
    job::DeliveryCallback,
    reminder::{Reminder, ReminderDraft, ReminderId, ReminderPatch, ReminderStatus, WorkDays},
};
use irregular_scheduler::{Diagnostics, FireOutcome, ReminderService, ServiceError};
use irregular_storage::StorageError;
use serde::Serialize;
use serde_json::json;

pub type AppState = Arc<ReminderService>;

/// What clients see of a reminder. Device and runner bookkeeping stay
/// internal.
#[derive(Debug, Serialize)]
pub struct ReminderView {
    pub id: ReminderId,
    pub version: u32,
    pub title: String,
    pub message: String,
    pub work_hours_start: Option<NaiveTime>,
    pub work_hours_end: Option<NaiveTime>,
    pub work_days: WorkDays,
    pub min_time: Option<NaiveDateTime>,
    pub max_time: Option<NaiveDateTime>,
    pub dist: DistributionKind,
    pub dist_params: DistributionParams,
    pub repeat: bool,
    pub spacing_min: Option<ReminderDuration>,
    pub spacing_max: Option<ReminderDuration>,
    pub alive: bool,
    pub last_trigger_time: Option<NaiveDateTime>,
    pub next_trigger_time: NaiveDateTime,
    pub status: ReminderStatus,
}

impl ReminderView {
    pub fn new(reminder: Reminder, now: NaiveDateTime) -> Self {
        Self {
            status: reminder.status(now),
            dist: reminder.distribution.kind(),
            dist_params: reminder.distribution.params(),
            id: reminder.id,
            version: reminder.version,
            title: reminder.title,
            message: reminder.message,
            work_hours_start: reminder.work_hours_start,
            work_hours_end: reminder.work_hours_end,
            work_days: reminder.work_days,
            min_time: reminder.min_time,
            max_time: reminder.max_time,
            repeat: reminder.repeat,
            spacing_min: reminder.spacing_min,
            spacing_max: reminder.spacing_max,
            alive: reminder.alive,
            last_trigger_time: reminder.last_trigger_time,
            next_trigger_time: reminder.next_trigger_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedView {
    pub id: ReminderId,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct DeliveryView {
    pub job_id: String,
    pub outcome: FireOutcome,
}

#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    Body(JsonRejection),
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        ApiError::Service(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::Body(value)
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Body(rejection) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "errors": { "body": rejection.body_text() } })),
                )
                    .into_response();
            }
            ApiError::Service(err) => err,
        };

        match err {
            ServiceError::Reminder(ReminderError::Validation(validation)) => {
                let mut errors = serde_json::Map::new();
                errors.insert(validation.field.to_owned(), validation.reason.into());
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            ServiceError::Reminder(err @ ReminderError::SamplingExhausted { .. }) => {
                error_body(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            err @ (ServiceError::NotFound(_) | ServiceError::UnknownJob(_)) => {
                error_body(StatusCode::NOT_FOUND, err.to_string())
            }
            err @ ServiceError::Storage(StorageError::AlreadyExists(_)) => {
                error_body(StatusCode::CONFLICT, err.to_string())
            }
            err => {
                log::error!("[API] Request failed. [error = {}]", err);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route(
            "/v1/reminders/{device_id}",
            get(list_reminders).post(create_reminder),
        )
        .route(
            "/v1/reminders/{device_id}/{id}",
            get(get_reminder)
                .patch(update_reminder)
                .put(update_reminder)
                .delete(delete_reminder),
        )
        .route("/v1/deliveries", post(delivery_callback))
        .route("/v1/diagnostics", get(diagnostics))
        .with_state(service)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "service": "irregular", "status": "ok" }))
}

async fn create_reminder(
    State(service): State<AppState>,
    Path(device_id): Path<String>,
    draft: Result<Json<ReminderDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<ReminderView>), ApiError> {
    let Json(draft) = draft?;
    let reminder = service.create(&device_id, draft).await?;
    let view = ReminderView::new(reminder, service.clock().now());
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_reminders(
    State(service): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<ReminderView>>, ApiError> {
    let now = service.clock().now();
    let reminders = service.list(&device_id).await?;
    Ok(Json(
        reminders
            .into_iter()
            .map(|reminder| ReminderView::new(reminder, now))
            .collect(),
    ))
}

async fn get_reminder(
    State(service): State<AppState>,
    Path((device_id, id)): Path<(String, ReminderId)>,
) -> Result<Json<ReminderView>, ApiError> {
    let reminder = service.get(&device_id, id).await?;
    Ok(Json(ReminderView::new(reminder, service.clock().now())))
}

async fn update_reminder(
    State(service): State<AppState>,
    Path((device_id, id)): Path<(String, ReminderId)>,
    patch: Result<Json<ReminderPatch>, JsonRejection>,
) -> Result<Json<ReminderView>, ApiError> {
    let Json(patch) = patch?;
    let reminder = service.update(&device_id, id, patch).await?;
    Ok(Json(ReminderView::new(reminder, service.clock().now())))
}

async fn delete_reminder(
    State(service): State<AppState>,
    Path((device_id, id)): Path<(String, ReminderId)>,
) -> Result<Json<DeletedView>, ApiError> {
    let deleted = service.delete(&device_id, id).await?;
    Ok(Json(DeletedView { id, deleted }))
}

async fn delivery_callback(
    State(service): State<AppState>,
    callback: Result<Json<DeliveryCallback>, JsonRejection>,
) -> Result<Json<DeliveryView>, ApiError> {
    let Json(callback) = callback?;
    let outcome = service.handle_delivery_callback(&callback).await?;
    Ok(Json(DeliveryView {
        job_id: callback.job_id,
        outcome,
    }))
}

async fn diagnostics(State(service): State<AppState>) -> Result<Json<Diagnostics>, ApiError> {
    Ok(Json(service.diagnostics().await?))
}
