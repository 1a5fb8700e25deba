//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use tracing::{info, warn};
use utoipa::OpenApi;
use validator::Validate;

use crate::app::{AppState, FETCH_LATEST_JOB, FIX_MISSING_JOB, SEND_NOTIFICATIONS_JOB};
use crate::domain::{
    AppError, ErrorDetail, ErrorResponse, FetchMissingRequest, HealthResponse, HealthStatus,
    JobRunResponse, NotificationSummary, ValidationError, WebhookPayload,
};

/// Name reported for manually requested range reconciliations
pub const FETCH_MISSING_JOB: &str = "fetch-missing-transactions";

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "TON Watcher Admin API",
        description = "Health probe and manual triggers for the TON wallet watcher jobs",
        license(
            name = "MIT"
        )
    ),
    paths(
        health_check_handler,
        fetch_latest_handler,
        fetch_missing_handler,
        fix_missing_handler,
        send_notifications_handler,
    ),
    components(
        schemas(
            HealthResponse,
            HealthStatus,
            FetchMissingRequest,
            JobRunResponse,
            NotificationSummary,
            WebhookPayload,
            ErrorResponse,
            ErrorDetail,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "jobs", description = "Manual job triggers")
    )
)]
pub struct ApiDoc;

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database is unreachable", body = HealthResponse)
    )
)]
pub async fn health_check_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let health = state.reconciliation.health_check().await;
    let status = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(health))
}

/// Fetch transactions newer than the stored watermark
#[utoipa::path(
    post,
    path = "/jobs/fetch-latest",
    tag = "jobs",
    responses(
        (status = 200, description = "Run finished", body = JobRunResponse),
        (status = 500, description = "Run failed", body = ErrorResponse),
        (status = 503, description = "Database unavailable", body = ErrorResponse)
    )
)]
pub async fn fetch_latest_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JobRunResponse>, AppError> {
    let processed = state.reconciliation.fetch_latest(state.shutdown.clone()).await?;
    info!(processed, "Manual latest fetch finished");
    Ok(Json(JobRunResponse {
        job: FETCH_LATEST_JOB.to_string(),
        processed,
    }))
}

/// Reconcile an explicit logical-time range
///
/// Scans `after_lt < lt < before_lt`, inserting transactions that were missed
/// and upgrading stored failures that the ledger now reports as successful.
#[utoipa::path(
    post,
    path = "/jobs/fetch-missing",
    tag = "jobs",
    request_body = FetchMissingRequest,
    responses(
        (status = 200, description = "Run finished", body = JobRunResponse),
        (status = 400, description = "Invalid range", body = ErrorResponse),
        (status = 500, description = "Run failed", body = ErrorResponse)
    )
)]
pub async fn fetch_missing_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FetchMissingRequest>,
) -> Result<Json<JobRunResponse>, AppError> {
    payload.validate().map_err(|e| {
        warn!(error = %e, "Validation failed");
        AppError::Validation(ValidationError::Multiple(e.to_string()))
    })?;

    let processed = state
        .reconciliation
        .fetch_missing(payload.after_lt, payload.before_lt, state.shutdown.clone())
        .await?;
    info!(
        after_lt = payload.after_lt,
        before_lt = payload.before_lt,
        processed,
        "Manual missing fetch finished"
    );
    Ok(Json(JobRunResponse {
        job: FETCH_MISSING_JOB.to_string(),
        processed,
    }))
}

/// Reconcile everything below the stored watermark
#[utoipa::path(
    post,
    path = "/jobs/fix-missing",
    tag = "jobs",
    responses(
        (status = 200, description = "Run finished", body = JobRunResponse),
        (status = 500, description = "Run failed", body = ErrorResponse)
    )
)]
pub async fn fix_missing_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JobRunResponse>, AppError> {
    let processed = state.reconciliation.fix_missing(state.shutdown.clone()).await?;
    Ok(Json(JobRunResponse {
        job: FIX_MISSING_JOB.to_string(),
        processed,
    }))
}

/// Deliver pending webhook notifications
#[utoipa::path(
    post,
    path = "/jobs/send-notifications",
    tag = "jobs",
    responses(
        (status = 200, description = "Run finished", body = NotificationSummary),
        (status = 500, description = "Run failed", body = ErrorResponse)
    )
)]
pub async fn send_notifications_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NotificationSummary>, AppError> {
    let summary = state.notifier.send_pending(state.shutdown.clone()).await?;
    info!(
        job = SEND_NOTIFICATIONS_JOB,
        delivered = summary.delivered,
        failed = summary.failed,
        "Manual notification run finished"
    );
    Ok(Json(summary))
}
