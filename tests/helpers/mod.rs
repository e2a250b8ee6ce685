//! Shared helpers for the queue integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use analysis_queue::config::AppConfig;
use analysis_queue::db::{self, jobs};
use analysis_queue::models::job::{AlgorithmType, AnalysisJob, JobPriority};
use analysis_queue::services::analyzer::{AnalysisOutput, Analyzer, AnalyzerError};
use serde_json::{json, Value};
use sqlx::PgPool;

/// Config for tests: immediate retry backoff so exhaustion scenarios do not
/// have to sleep, everything else at defaults.
pub fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        database_url: database_url.to_string(),
        analyzer_url: "http://localhost:9999".to_string(),
        analyzer_api_token: "test-token".to_string(),
        worker_poll_interval_ms: 10,
        default_max_retries: 3,
        cache_ttl_secs: 3600,
        timeout_basic_secs: 30,
        timeout_advanced_secs: 120,
        timeout_ai_powered_secs: 300,
        retry_backoff_base_secs: 0,
        retry_backoff_cap_secs: 0,
    }
}

/// Connect, migrate, and wipe all queue tables.
pub async fn setup_pool() -> (PgPool, AppConfig) {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    let pool = db::init_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    sqlx::query("TRUNCATE analysis_jobs, analysis_results, result_cache CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to reset tables");

    (pool, test_config(&database_url))
}

/// Enqueue a job with the given knobs, defaulting the rest.
pub async fn enqueue_job(
    pool: &PgPool,
    image_id: &str,
    algorithm_type: AlgorithmType,
    priority: JobPriority,
    max_retries: i32,
) -> AnalysisJob {
    jobs::enqueue(
        pool,
        &jobs::NewJob {
            image_id: image_id.to_string(),
            requester_id: "test-requester".to_string(),
            algorithm_type,
            parameters: json!({}),
            priority,
            max_retries,
        },
    )
    .await
    .expect("Failed to enqueue job")
}

/// Rewrite a job's creation timestamp so ordering scenarios are
/// deterministic.
pub async fn backdate_job(pool: &PgPool, job: &AnalysisJob, seconds_ago: i64) {
    sqlx::query("UPDATE analysis_jobs SET created_at = now() - make_interval(secs => $2) WHERE id = $1")
        .bind(job.id)
        .bind(seconds_ago as f64)
        .execute(pool)
        .await
        .expect("Failed to backdate job");
}

/// Analyzer stub that always succeeds, counting invocations.
#[derive(Clone, Default)]
pub struct SucceedingAnalyzer {
    pub calls: Arc<AtomicUsize>,
}

impl Analyzer for SucceedingAnalyzer {
    async fn analyze(
        &self,
        image_id: &str,
        _algorithm_type: AlgorithmType,
        _parameters: &Value,
    ) -> Result<AnalysisOutput, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AnalysisOutput {
            payload: json!({"image_id": image_id, "regions": [{"x": 1, "y": 2}]}),
            confidence_score: 0.93,
            quality_metrics: json!({"sharpness": 0.8}),
            algorithm_version: "stub-1.0".to_string(),
        })
    }
}

/// Analyzer stub that always fails with the configured classification.
#[derive(Clone)]
pub struct FailingAnalyzer {
    pub retryable: bool,
    pub calls: Arc<AtomicUsize>,
}

impl FailingAnalyzer {
    pub fn retryable() -> Self {
        Self {
            retryable: true,
            calls: Arc::default(),
        }
    }

    pub fn terminal() -> Self {
        Self {
            retryable: false,
            calls: Arc::default(),
        }
    }
}

impl Analyzer for FailingAnalyzer {
    async fn analyze(
        &self,
        _image_id: &str,
        _algorithm_type: AlgorithmType,
        _parameters: &Value,
    ) -> Result<AnalysisOutput, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.retryable {
            Err(AnalyzerError::Retryable("simulated transient failure".into()))
        } else {
            Err(AnalyzerError::Terminal("simulated invalid image".into()))
        }
    }
}
