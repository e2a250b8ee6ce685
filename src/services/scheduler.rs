//! Job selection for free workers.
//!
//! There is no scheduler thread: coordination happens entirely through the
//! queue store's atomic claim. This module layers the retry re-admission
//! pass and the backoff policy on top of `db::jobs`.

use std::time::Duration;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::jobs;
use crate::error::QueueError;
use crate::models::job::AnalysisJob;

/// Delay before the n-th retry becomes claimable again: `base * 2^(n-1)`,
/// capped so a persistently failing analyzer cannot hot-loop.
pub fn backoff(retry_count: i32, base: Duration, cap: Duration) -> Duration {
    let exponent = retry_count.saturating_sub(1).clamp(0, 32) as u32;
    base.saturating_mul(2u32.saturating_pow(exponent)).min(cap)
}

/// Select and claim the next job for `worker_id`.
///
/// Due `retrying` jobs are first promoted back to `queued`, then one row is
/// claimed under `FOR UPDATE SKIP LOCKED`. `None` means the queue is empty;
/// poll again later, it is not a failure.
pub async fn claim_next(
    pool: &PgPool,
    worker_id: &str,
    config: &AppConfig,
) -> Result<Option<AnalysisJob>, QueueError> {
    let promoted = jobs::promote_due_retries(
        pool,
        config.retry_backoff_base_secs as f64,
        config.retry_backoff_cap_secs as f64,
    )
    .await?;
    if promoted > 0 {
        tracing::debug!(promoted, "re-admitted retrying jobs past their backoff");
    }

    let claimed = jobs::claim_next(
        pool,
        worker_id,
        config.timeout_basic_secs as f64,
        config.timeout_advanced_secs as f64,
        config.timeout_ai_powered_secs as f64,
    )
    .await?;

    if let Some(job) = &claimed {
        tracing::info!(
            job_id = %job.id,
            worker_id,
            priority = %job.priority,
            algorithm = %job.algorithm_type,
            retry_count = job.retry_count,
            "claimed job"
        );
    }

    Ok(claimed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(5);
    const CAP: Duration = Duration::from_secs(300);

    #[test]
    fn test_backoff_grows_exponentially() {
        assert_eq!(backoff(1, BASE, CAP), Duration::from_secs(5));
        assert_eq!(backoff(2, BASE, CAP), Duration::from_secs(10));
        assert_eq!(backoff(3, BASE, CAP), Duration::from_secs(20));
        assert_eq!(backoff(4, BASE, CAP), Duration::from_secs(40));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff(10, BASE, CAP), CAP);
        assert_eq!(backoff(i32::MAX, BASE, CAP), CAP);
    }

    #[test]
    fn test_backoff_handles_degenerate_counts() {
        // retry_count below 1 never occurs for a retrying job, but the
        // function must not panic or underflow if handed one.
        assert_eq!(backoff(0, BASE, CAP), BASE);
        assert_eq!(backoff(-1, BASE, CAP), BASE);
    }

    #[test]
    fn test_backoff_zero_base_is_immediate() {
        assert_eq!(backoff(3, Duration::ZERO, CAP), Duration::ZERO);
    }
}
