use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{AnalysisJob, JobPriority, JobStatus};

/// Request to enqueue an analysis job.
///
/// `algorithm_type` and `priority` arrive as strings and are parsed against
/// the closed enums in the handler; unknown values are a `ValidationError`,
/// and no job row is created.
#[derive(Debug, Deserialize, Validate)]
pub struct EnqueueRequest {
    #[garde(length(min = 1, max = 256))]
    pub image_id: String,

    #[garde(length(min = 1, max = 256))]
    pub requester_id: String,

    #[garde(length(min = 1, max = 64))]
    pub algorithm_type: String,

    /// Opaque analyzer parameters; defaults to an empty map.
    #[garde(skip)]
    pub parameters: Option<serde_json::Value>,

    #[garde(inner(length(min = 1, max = 64)))]
    pub priority: Option<String>,
}

/// Response after enqueueing a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Snapshot returned by status polling. Always well-defined: a failed job
/// carries its human-readable `error_message`, a completed one its result
/// payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub image_id: String,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub algorithm_type: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl JobSnapshot {
    pub fn from_job(job: AnalysisJob, result: Option<serde_json::Value>) -> Self {
        Self {
            job_id: job.id,
            image_id: job.image_id,
            status: job.status,
            priority: job.priority,
            algorithm_type: job.algorithm_type.to_string(),
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            error_message: job.error_message,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            estimated_completion_at: job.estimated_completion_at,
            result,
        }
    }
}

/// Query string for the admin queue listing.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct QueueListQuery {
    #[garde(inner(length(min = 1, max = 32)))]
    pub status: Option<String>,

    #[garde(inner(length(min = 1, max = 32)))]
    pub priority: Option<String>,

    #[garde(inner(range(min = 1, max = 500)))]
    pub limit: Option<i64>,

    #[garde(inner(range(min = 0)))]
    pub offset: Option<i64>,

    /// One of `created_at`, `priority`, `status`.
    #[garde(inner(length(min = 1, max = 32)))]
    pub sort: Option<String>,

    /// `asc` or `desc`.
    #[garde(inner(length(min = 1, max = 8)))]
    pub order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueListResponse {
    pub jobs: Vec<JobSnapshot>,
    pub limit: i64,
    pub offset: i64,
}

/// Priority override. `reason` lands in the audit log, never in scheduling.
#[derive(Debug, Deserialize, Validate)]
pub struct SetPriorityRequest {
    #[garde(length(min = 1, max = 64))]
    pub priority: String,

    #[garde(inner(length(max = 500)))]
    pub reason: Option<String>,
}

/// Aggregated queue statistics for operator tooling.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStats {
    /// Row counts per status, across the whole table.
    pub depth_by_status: std::collections::BTreeMap<String, i64>,
    /// Row counts per priority among jobs still awaiting work
    /// (`queued` or `retrying`).
    pub depth_by_priority: std::collections::BTreeMap<String, i64>,
    pub avg_queued_age_seconds: f64,
    /// Fraction of jobs that needed at least one retry.
    pub retry_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_request_validation() {
        let ok = EnqueueRequest {
            image_id: "img-1".into(),
            requester_id: "user-1".into(),
            algorithm_type: "basic".into(),
            parameters: None,
            priority: Some("high".into()),
        };
        assert!(ok.validate().is_ok());

        let empty_image = EnqueueRequest {
            image_id: String::new(),
            requester_id: "user-1".into(),
            algorithm_type: "basic".into(),
            parameters: None,
            priority: None,
        };
        assert!(empty_image.validate().is_err());
    }

    #[test]
    fn test_list_query_bounds() {
        let ok = QueueListQuery {
            limit: Some(50),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let too_big = QueueListQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert!(too_big.validate().is_err());

        let negative_offset = QueueListQuery {
            offset: Some(-1),
            ..Default::default()
        };
        assert!(negative_offset.validate().is_err());
    }
}
