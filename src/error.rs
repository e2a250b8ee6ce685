use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::models::job::JobStatus;

/// Error taxonomy for queue operations.
///
/// `Conflict` is the recoverable case: the caller re-reads current state and
/// decides whether to retry the intent. `InvalidTransition` is a programming
/// or operational error and is rejected without side effects.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("job {job_id} is {actual}; another actor moved it first")]
    Conflict { job_id: Uuid, actual: JobStatus },

    #[error("transition {from} -> {to} is not in the state graph")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl QueueError {
    fn status_code(&self) -> StatusCode {
        match self {
            QueueError::Validation(_) => StatusCode::BAD_REQUEST,
            QueueError::Conflict { .. } => StatusCode::CONFLICT,
            QueueError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            QueueError::NotFound(_) => StatusCode::NOT_FOUND,
            QueueError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Raw backend errors never reach clients.
        let message = match &self {
            QueueError::Database(e) => {
                tracing::error!(error = %e, "database error while serving request");
                "internal error".to_string()
            }
            QueueError::InvalidTransition { .. } => {
                tracing::error!(error = %self, "rejected invalid state transition");
                self.to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            QueueError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            QueueError::Conflict {
                job_id: id,
                actual: JobStatus::Processing
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            QueueError::InvalidTransition {
                from: JobStatus::Completed,
                to: JobStatus::Queued
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(QueueError::NotFound(id).status_code(), StatusCode::NOT_FOUND);
    }
}
