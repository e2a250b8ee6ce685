use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable output of a successfully completed analysis job.
///
/// Created exactly once by the worker, immediately before the owning job
/// moves to `completed`; immutable afterwards. Jobs served from the result
/// cache reference an existing row instead of creating a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    /// The job that computed this result (1:1).
    pub job_id: Uuid,
    pub image_id: String,
    pub algorithm_version: String,
    /// Echo of the job's parameters, kept for reproducibility.
    pub algorithm_parameters: serde_json::Value,
    pub payload: serde_json::Value,
    pub confidence_score: f64,
    pub processing_time_ms: i64,
    pub quality_metrics: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields the worker supplies when persisting a fresh result.
#[derive(Debug, Clone)]
pub struct NewResult {
    pub job_id: Uuid,
    pub image_id: String,
    pub algorithm_version: String,
    pub algorithm_parameters: serde_json::Value,
    pub payload: serde_json::Value,
    pub confidence_score: f64,
    pub processing_time_ms: i64,
    pub quality_metrics: serde_json::Value,
}
