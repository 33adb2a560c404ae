//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the
//! service layer for business logic.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;

use super::dto::{
    CacheActionAccepted, CacheActionRequest, CacheListResponse, HealthResponse, JobStatusResponse,
    ReportRequest, ReportResponse,
};
use super::error::AppError;
use super::state::AppState;
use crate::api::{CacheAction, CacheStatus};
use crate::cache::CacheTable;
use crate::db::repository::ReportRepository;
use crate::services::job_tracker::{JobStatus, JobTracker, LogLevel};
use crate::services::{self, CacheService};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and database is accessible.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match state.repository.health_check().await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Reports
// =============================================================================

/// POST /v1/reports
///
/// Execute a report request and return its named, time-bucketed series.
pub async fn run_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> HandlerResult<ReportResponse> {
    let series = services::run_report(
        state.repository.as_ref(),
        &request.params,
        &request.access,
        request.use_cache,
    )
    .await?;

    let total = series.len();
    Ok(Json(ReportResponse { series, total }))
}

// =============================================================================
// Cache Lifecycle
// =============================================================================

fn parse_cache_table(slug: &str) -> Result<CacheTable, AppError> {
    CacheTable::from_slug(slug)
        .ok_or_else(|| AppError::NotFound(format!("Unknown cache table: {}", slug)))
}

/// GET /v1/caches
///
/// Status of all cache tables.
pub async fn list_caches(State(state): State<AppState>) -> HandlerResult<CacheListResponse> {
    let caches = state.cache_service.statuses().await?;
    let total = caches.len();
    Ok(Json(CacheListResponse { caches, total }))
}

/// GET /v1/caches/{cache}
///
/// Status of a single cache table.
pub async fn cache_status(
    State(state): State<AppState>,
    Path(cache): Path<String>,
) -> HandlerResult<CacheStatus> {
    let table = parse_cache_table(&cache)?;
    let status = state
        .cache_service
        .execute(table, &crate::api::CacheParams::for_action(CacheAction::Status))
        .await?;
    Ok(Json(status))
}

/// POST /v1/caches/{cache}
///
/// Execute a cache lifecycle action. Synchronous actions return the
/// post-action status; `background: true` on rebuild/update returns `202`
/// with a job ID, observable through the job endpoints.
pub async fn cache_action(
    State(state): State<AppState>,
    Path(cache): Path<String>,
    Json(request): Json<CacheActionRequest>,
) -> Result<axum::response::Response, AppError> {
    use axum::response::IntoResponse;

    let table = parse_cache_table(&cache)?;

    if request.params.action.is_mutating() && !request.access.is_admin {
        return Err(AppError::Forbidden(
            "cache administration requires reporting admin rights".to_string(),
        ));
    }

    let background_capable = matches!(
        request.params.action,
        CacheAction::Rebuild | CacheAction::Update
    );
    if request.background && background_capable {
        let job_id = state.job_tracker.create_job();
        let response_job_id = job_id.clone();

        let tracker = state.job_tracker.clone();
        let service = state.cache_service.clone();
        let params = request.params.clone();
        tokio::spawn(async move {
            run_cache_action_job(service, tracker, job_id, table, params).await;
        });

        let body = CacheActionAccepted {
            job_id: response_job_id.clone(),
            message: format!(
                "Cache {:?} started. Track progress at /v1/jobs/{}/logs",
                request.params.action, response_job_id
            ),
        };
        return Ok((axum::http::StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let status = state.cache_service.execute(table, &request.params).await?;
    Ok(Json(status).into_response())
}

/// Drive one background cache action and record its outcome in the tracker.
async fn run_cache_action_job(
    service: std::sync::Arc<CacheService>,
    tracker: JobTracker,
    job_id: String,
    table: CacheTable,
    params: crate::api::CacheParams,
) {
    tracker.log(
        &job_id,
        LogLevel::Info,
        format!("{:?} started on {}", params.action, table.table_name()),
    );
    match service.execute(table, &params).await {
        Ok(status) => {
            tracker.log(&job_id, LogLevel::Success, status.summary.clone());
            tracker.complete_job(&job_id, serde_json::to_value(&status).ok());
        }
        Err(e) => tracker.fail_job(&job_id, e.to_string()),
    }
}

// =============================================================================
// Async Job Management
// =============================================================================

/// GET /v1/jobs/{job_id}
///
/// Get the current status and logs of a background job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> HandlerResult<JobStatusResponse> {
    let job = state
        .job_tracker
        .get_job(&job_id)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

    Ok(Json(JobStatusResponse {
        job_id: job.job_id,
        status: format!("{:?}", job.status).to_lowercase(),
        logs: job.logs,
        result: job.result,
    }))
}

/// GET /v1/jobs/{job_id}/logs
///
/// Stream job logs via Server-Sent Events (SSE).
pub async fn stream_job_logs(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Verify job exists
    if state.job_tracker.get_job(&job_id).is_none() {
        return Err(AppError::NotFound(format!("Job {} not found", job_id)));
    }

    let tracker = state.job_tracker.clone();
    let stream = async_stream::stream! {
        let mut last_log_count = 0;
        loop {
            let logs = tracker.get_logs(&job_id);

            // Send new logs since last check
            for log in logs.iter().skip(last_log_count) {
                let event_data = serde_json::to_string(log).unwrap_or_default();
                yield Ok(Event::default().data(event_data));
            }
            last_log_count = logs.len();

            // Check if job is complete
            if let Some(job) = tracker.get_job(&job_id) {
                if job.status != JobStatus::Running {
                    // Serde serialization keeps the status values lowercase
                    // ("completed", "failed").
                    let final_event = serde_json::json!({
                        "status": job.status,
                        "result": job.result,
                    });
                    yield Ok(Event::default()
                        .event("complete")
                        .data(serde_json::to_string(&final_event).unwrap_or_default()));
                    break;
                }
            } else {
                break;
            }

            // Wait before checking again
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(1))
            .text("keep-alive"),
    ))
}
