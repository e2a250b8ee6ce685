//! Operator control surface. Reads are plain projections; writes go through
//! the same state machine as everything else.

use axum::extract::{Path, Query, State};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::jobs::{self, QueueFilter, QueueSortField, SortDirection};
use crate::error::QueueError;
use crate::models::api::{
    JobSnapshot, QueueListQuery, QueueListResponse, QueueStats, SetPriorityRequest,
};
use crate::models::job::{JobPriority, JobStatus};

const DEFAULT_LIMIT: i64 = 50;

/// GET /api/v1/admin/queue — filtered, paginated, sorted queue listing.
pub async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueListQuery>,
) -> Result<Json<QueueListResponse>, QueueError> {
    query
        .validate()
        .map_err(|e| QueueError::Validation(e.to_string()))?;

    let mut filter = QueueFilter::default();
    if let Some(status) = query.status.as_deref() {
        filter.status = Some(
            status
                .parse::<JobStatus>()
                .map_err(|_| QueueError::Validation(format!("unknown status: {status}")))?,
        );
    }
    if let Some(priority) = query.priority.as_deref() {
        filter.priority = Some(
            priority
                .parse::<JobPriority>()
                .map_err(|_| QueueError::Validation(format!("unknown priority: {priority}")))?,
        );
    }

    let sort = match query.sort.as_deref() {
        Some(field) => field
            .parse::<QueueSortField>()
            .map_err(|_| QueueError::Validation(format!("unknown sort field: {field}")))?,
        None => QueueSortField::default(),
    };
    let direction = match query.order.as_deref() {
        Some(order) => order
            .parse::<SortDirection>()
            .map_err(|_| QueueError::Validation(format!("unknown sort order: {order}")))?,
        None => SortDirection::default(),
    };

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let jobs = jobs::list_queue(&state.db, filter, sort, direction, limit, offset).await?;

    Ok(Json(QueueListResponse {
        jobs: jobs
            .into_iter()
            .map(|job| JobSnapshot::from_job(job, None))
            .collect(),
        limit,
        offset,
    }))
}

/// GET /api/v1/admin/queue/stats — depth by status/priority, average queued
/// age, retry rate.
pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, QueueError> {
    let aggregates = jobs::queue_stats(&state.db).await?;

    let queued_depth = aggregates
        .depth_by_status
        .iter()
        .filter(|(status, _)| status == "queued" || status == "retrying")
        .map(|(_, depth)| depth)
        .sum::<i64>();
    metrics::gauge!("analysis_queue_depth").set(queued_depth as f64);

    Ok(Json(QueueStats {
        depth_by_status: aggregates.depth_by_status.into_iter().collect(),
        depth_by_priority: aggregates.depth_by_priority.into_iter().collect(),
        avg_queued_age_seconds: aggregates.avg_queued_age_seconds,
        retry_rate: aggregates.retry_rate,
    }))
}

/// PUT /api/v1/admin/queue/{job_id}/priority — reorder a waiting job.
///
/// `reason` goes to the audit log only; it has no effect on scheduling.
pub async fn set_priority(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<SetPriorityRequest>,
) -> Result<Json<JobSnapshot>, QueueError> {
    request
        .validate()
        .map_err(|e| QueueError::Validation(e.to_string()))?;

    let priority = request.priority.parse::<JobPriority>().map_err(|_| {
        QueueError::Validation(format!("unknown priority: {}", request.priority))
    })?;

    let job = jobs::update_priority(&state.db, job_id, priority).await?;

    tracing::info!(
        job_id = %job_id,
        new_priority = %priority,
        reason = request.reason.as_deref().unwrap_or("(none given)"),
        "priority override"
    );

    Ok(Json(JobSnapshot::from_job(job, None)))
}

/// DELETE /api/v1/admin/queue/{job_id} — cancel a job that has not been
/// claimed. Returns 409 if a worker already holds it or it is terminal.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSnapshot>, QueueError> {
    let job = jobs::cancel(&state.db, job_id).await?;

    tracing::info!(job_id = %job_id, "job cancelled by operator");

    Ok(Json(JobSnapshot::from_job(job, None)))
}
