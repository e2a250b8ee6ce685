//! End-to-end execution of a single claimed job.
//!
//! One `run_once` call claims a job, consults the result cache, invokes the
//! analyzer under its deadline on a miss, and reports the outcome through
//! the queue store's transition primitive. A job's failure is contained to
//! its own record; the loop itself never dies because of one bad job.

use std::time::Instant;

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::{cache, jobs, results};
use crate::error::QueueError;
use crate::models::job::{AnalysisJob, JobStatus};
use crate::models::result::NewResult;
use crate::services::analyzer::{Analyzer, AnalyzerError};
use crate::services::{fingerprint, scheduler};

/// Decide where a failed attempt goes: `retrying` while the budget holds and
/// the failure is transient, `failed` otherwise.
fn next_status_on_failure(retryable: bool, retry_count: i32, max_retries: i32) -> JobStatus {
    if retryable && retry_count < max_retries {
        JobStatus::Retrying
    } else {
        JobStatus::Failed
    }
}

pub struct WorkerLoop<A: Analyzer> {
    pool: PgPool,
    analyzer: A,
    config: AppConfig,
    worker_id: String,
}

impl<A: Analyzer> WorkerLoop<A> {
    pub fn new(pool: PgPool, analyzer: A, config: AppConfig, worker_id: String) -> Self {
        Self {
            pool,
            analyzer,
            config,
            worker_id,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim and execute one job.
    /// Returns Ok(true) if a job was handled, Ok(false) if the queue was empty.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        let job = match scheduler::claim_next(&self.pool, &self.worker_id, &self.config).await? {
            Some(job) => job,
            None => return Ok(false),
        };

        self.execute(job).await?;
        Ok(true)
    }

    async fn execute(&self, job: AnalysisJob) -> Result<(), QueueError> {
        let key = fingerprint::cache_key(&job.image_id, job.algorithm_type, &job.parameters);

        // Identical work may already have a live cached result.
        if let Some(hit) = cache::lookup(&self.pool, &key).await? {
            metrics::counter!("analysis_cache_hits_total").increment(1);
            tracing::info!(
                job_id = %job.id,
                cache_key = %key,
                hit_count = hit.hit_count,
                "serving job from result cache"
            );
            self.finish(&job, JobStatus::Completed, Some(hit.result_id), None)
                .await;
            return Ok(());
        }
        metrics::counter!("analysis_cache_misses_total").increment(1);

        let deadline = self.config.processing_timeout(job.algorithm_type);
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            deadline,
            self.analyzer
                .analyze(&job.image_id, job.algorithm_type, &job.parameters),
        )
        .await;

        match outcome {
            Ok(Ok(output)) => {
                let elapsed = started.elapsed();
                metrics::histogram!("analysis_processing_seconds").record(elapsed.as_secs_f64());

                let result = results::insert_result(
                    &self.pool,
                    &NewResult {
                        job_id: job.id,
                        image_id: job.image_id.clone(),
                        algorithm_version: output.algorithm_version,
                        algorithm_parameters: job.parameters.clone(),
                        payload: output.payload,
                        confidence_score: output.confidence_score,
                        processing_time_ms: (elapsed.as_millis() as i64).max(1),
                        quality_metrics: output.quality_metrics,
                    },
                )
                .await?;

                let size_bytes = result.payload.to_string().len() as i64;
                cache::store(
                    &self.pool,
                    &key,
                    result.id,
                    self.config.cache_ttl_secs,
                    size_bytes,
                )
                .await?;

                tracing::info!(
                    job_id = %job.id,
                    result_id = %result.id,
                    confidence = result.confidence_score,
                    processing_time_ms = result.processing_time_ms,
                    "analysis complete"
                );
                self.finish(&job, JobStatus::Completed, Some(result.id), None)
                    .await;
            }
            Ok(Err(error)) => {
                tracing::warn!(job_id = %job.id, error = %error, "analysis failed");
                self.handle_failure(&job, error.is_retryable(), error.to_string())
                    .await;
            }
            Err(_) => {
                // Deadline exceeded is always transient.
                let message = format!("analysis timed out after {}s", deadline.as_secs());
                tracing::warn!(job_id = %job.id, timeout_secs = deadline.as_secs(), "analysis timed out");
                self.handle_failure(&job, true, message).await;
            }
        }

        Ok(())
    }

    async fn handle_failure(&self, job: &AnalysisJob, retryable: bool, message: String) {
        let to = next_status_on_failure(retryable, job.retry_count, job.max_retries);

        match to {
            JobStatus::Retrying => {
                metrics::counter!("analysis_jobs_retried_total").increment(1)
            }
            _ => metrics::counter!("analysis_jobs_failed_total").increment(1),
        }

        self.finish(job, to, None, Some(message)).await;
    }

    /// Report the terminal outcome of a held job. A `Conflict` here means an
    /// external actor (e.g. the stale-job reaper) moved the job while we
    /// held it; the work is lost but the loop carries on.
    async fn finish(
        &self,
        job: &AnalysisJob,
        to: JobStatus,
        result_id: Option<Uuid>,
        error_message: Option<String>,
    ) {
        if to == JobStatus::Completed {
            metrics::counter!("analysis_jobs_completed_total").increment(1);
        }

        let outcome = jobs::transition(
            &self.pool,
            job.id,
            JobStatus::Processing,
            to,
            jobs::TransitionContext {
                worker_id: None,
                error_message,
                result_id,
            },
        )
        .await;

        match outcome {
            Ok(updated) => {
                tracing::debug!(job_id = %updated.id, status = %updated.status, "job transitioned");
            }
            Err(QueueError::Conflict { job_id, actual }) => {
                tracing::warn!(
                    job_id = %job_id,
                    actual = %actual,
                    intended = %to,
                    "job was moved by another actor while we held it"
                );
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "failed to record job outcome");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_failure_within_budget_retries() {
        assert_eq!(
            next_status_on_failure(true, 0, 3),
            JobStatus::Retrying
        );
        assert_eq!(
            next_status_on_failure(true, 2, 3),
            JobStatus::Retrying
        );
    }

    #[test]
    fn test_exhausted_budget_fails() {
        assert_eq!(next_status_on_failure(true, 3, 3), JobStatus::Failed);
        assert_eq!(next_status_on_failure(true, 4, 3), JobStatus::Failed);
    }

    #[test]
    fn test_terminal_failure_ignores_budget() {
        assert_eq!(next_status_on_failure(false, 0, 3), JobStatus::Failed);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        assert_eq!(next_status_on_failure(true, 0, 0), JobStatus::Failed);
    }
}
