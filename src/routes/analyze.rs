use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{jobs, results};
use crate::error::QueueError;
use crate::models::api::{EnqueueRequest, EnqueueResponse, JobSnapshot};
use crate::models::job::{AlgorithmType, JobPriority};

/// POST /api/v1/analyses — enqueue an image analysis job.
///
/// The caller is already authorized and the image identifier validated
/// upstream; this handler only checks the request shape and the closed
/// enums. Unknown algorithm or priority values are rejected before any row
/// is created.
pub async fn enqueue_analysis(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), QueueError> {
    request
        .validate()
        .map_err(|e| QueueError::Validation(e.to_string()))?;

    let algorithm_type = request.algorithm_type.parse::<AlgorithmType>().map_err(|_| {
        QueueError::Validation(format!(
            "unknown algorithm_type: {}",
            request.algorithm_type
        ))
    })?;

    let priority = match request.priority.as_deref() {
        Some(p) => p
            .parse::<JobPriority>()
            .map_err(|_| QueueError::Validation(format!("unknown priority: {p}")))?,
        None => JobPriority::Normal,
    };

    let job = jobs::enqueue(
        &state.db,
        &jobs::NewJob {
            image_id: request.image_id,
            requester_id: request.requester_id,
            algorithm_type,
            parameters: request.parameters.unwrap_or_else(|| serde_json::json!({})),
            priority,
            max_retries: state.config.default_max_retries,
        },
    )
    .await?;

    metrics::counter!("analysis_jobs_enqueued_total").increment(1);
    tracing::info!(
        job_id = %job.id,
        image_id = %job.image_id,
        algorithm = %job.algorithm_type,
        priority = %job.priority,
        "job enqueued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// GET /api/v1/analyses/{job_id} — poll a job snapshot.
///
/// Always a well-defined snapshot: completed jobs carry their result
/// payload, failed ones their `error_message`.
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSnapshot>, QueueError> {
    let job = jobs::get_job(&state.db, job_id)
        .await?
        .ok_or(QueueError::NotFound(job_id))?;

    let result = match job.result_id {
        Some(result_id) => results::get_result(&state.db, result_id)
            .await?
            .map(|r| r.payload),
        None => None,
    };

    Ok(Json(JobSnapshot::from_job(job, result)))
}
