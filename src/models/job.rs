use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of an analysis job in the queue.
///
/// Stored as lowercase text in `analysis_jobs.status`. Every write to that
/// column goes through the compare-and-swap transition in `db::jobs`, which
/// consults [`JobStatus::can_transition_to`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Retrying,
    Cancelled,
}

impl JobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// The allowed state-machine edges.
    ///
    /// `queued → processing` is the worker claim, `retrying → queued` is
    /// re-admission after backoff, and cancellation is only reachable from
    /// the two unclaimed states. Everything else is rejected before any SQL
    /// runs.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Queued, Processing)
                | (Queued, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Retrying)
                | (Retrying, Queued)
                | (Retrying, Cancelled)
        )
    }
}

/// Scheduling priority. Orders claims, never preempts in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    Normal,
    High,
}

impl JobPriority {
    /// Numeric rank used for `ORDER BY ... DESC` in the claim query.
    pub fn rank(self) -> i16 {
        match self {
            JobPriority::Low => 0,
            JobPriority::Normal => 1,
            JobPriority::High => 2,
        }
    }
}

/// Which analyzer pipeline processes the image. Heavier pipelines get a
/// longer processing budget (see `AppConfig::processing_timeout`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmType {
    Basic,
    Advanced,
    AiPowered,
}

/// A unit of scheduled analysis work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub image_id: String,
    pub requester_id: String,
    pub algorithm_type: AlgorithmType,
    /// Opaque key-value map handed through to the analyzer, never inspected
    /// by the queue.
    pub parameters: serde_json::Value,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    /// Identity of the worker holding the job; `Some` iff `processing`.
    pub worker_id: Option<String>,
    /// The result that satisfied this job. On a cache hit this points at a
    /// result computed by an earlier job with the same fingerprint.
    pub result_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Retrying,
        JobStatus::Cancelled,
    ];

    #[test]
    fn test_allowed_edges() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Retrying));
        assert!(JobStatus::Retrying.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Retrying.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_state_graph_closure() {
        // Everything outside the seven allowed edges must be rejected,
        // including self-transitions and anything out of a terminal state.
        let allowed = [
            (JobStatus::Queued, JobStatus::Processing),
            (JobStatus::Queued, JobStatus::Cancelled),
            (JobStatus::Processing, JobStatus::Completed),
            (JobStatus::Processing, JobStatus::Failed),
            (JobStatus::Processing, JobStatus::Retrying),
            (JobStatus::Retrying, JobStatus::Queued),
            (JobStatus::Retrying, JobStatus::Cancelled),
        ];
        for from in ALL {
            for to in ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "unexpected verdict for {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in ALL {
            let text = status.to_string();
            assert_eq!(text.parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!(JobStatus::Queued.to_string(), "queued");
        assert!("pending".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_priority_rank_ordering() {
        assert!(JobPriority::High.rank() > JobPriority::Normal.rank());
        assert!(JobPriority::Normal.rank() > JobPriority::Low.rank());
        assert_eq!("high".parse::<JobPriority>().unwrap(), JobPriority::High);
        assert!("urgent".parse::<JobPriority>().is_err());
    }

    #[test]
    fn test_algorithm_type_parsing() {
        assert_eq!(
            "ai_powered".parse::<AlgorithmType>().unwrap(),
            AlgorithmType::AiPowered
        );
        assert_eq!(AlgorithmType::AiPowered.to_string(), "ai_powered");
        assert!("quantum".parse::<AlgorithmType>().is_err());
    }
}
