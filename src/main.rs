mod app_state;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use axum::{routing::delete, routing::get, routing::post, routing::put, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;

const QUEUE_DEPTH_SAMPLE_INTERVAL_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing analysis-queue server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "analysis_jobs_enqueued_total",
        "Total analysis jobs accepted into the queue"
    );
    metrics::describe_counter!(
        "analysis_jobs_completed_total",
        "Total analysis jobs completed"
    );
    metrics::describe_counter!(
        "analysis_jobs_failed_total",
        "Total analysis jobs that failed terminally"
    );
    metrics::describe_counter!(
        "analysis_jobs_retried_total",
        "Total retryable failures sent back for another attempt"
    );
    metrics::describe_counter!(
        "analysis_cache_hits_total",
        "Jobs served from the result cache"
    );
    metrics::describe_counter!(
        "analysis_cache_misses_total",
        "Jobs that required a fresh analyzer invocation"
    );
    metrics::describe_gauge!(
        "analysis_queue_depth",
        "Jobs currently awaiting work (queued or retrying)"
    );
    metrics::describe_histogram!(
        "analysis_processing_seconds",
        "Time spent in the external analyzer per job"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Create shared application state
    let state = AppState::new(db_pool.clone(), config.clone());

    // Periodically sample queue depth for the gauge
    tokio::spawn(async move {
        loop {
            let depth: Result<i64, sqlx::Error> = sqlx::query(
                "SELECT COUNT(*) AS depth FROM analysis_jobs WHERE status IN ('queued', 'retrying')",
            )
            .fetch_one(&db_pool)
            .await
            .and_then(|row| row.try_get("depth"));

            match depth {
                Ok(depth) => metrics::gauge!("analysis_queue_depth").set(depth as f64),
                Err(e) => tracing::warn!(error = %e, "failed to sample queue depth"),
            }

            tokio::time::sleep(Duration::from_secs(QUEUE_DEPTH_SAMPLE_INTERVAL_SECS)).await;
        }
    });

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/analyses", post(routes::analyze::enqueue_analysis))
        .route(
            "/api/v1/analyses/{job_id}",
            get(routes::analyze::get_analysis),
        )
        .route("/api/v1/admin/queue", get(routes::admin::list_queue))
        .route("/api/v1/admin/queue/stats", get(routes::admin::queue_stats))
        .route(
            "/api/v1/admin/queue/{job_id}/priority",
            put(routes::admin::set_priority),
        )
        .route(
            "/api/v1/admin/queue/{job_id}",
            delete(routes::admin::cancel_job),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit

    tracing::info!("Starting analysis-queue on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
