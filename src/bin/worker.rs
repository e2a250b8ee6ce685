use analysis_queue::{
    config::AppConfig,
    db,
    services::{analyzer::HttpAnalyzer, worker::WorkerLoop},
};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting analysis worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Analyzer backend
    let analyzer = HttpAnalyzer::new(&config.analyzer_url, &config.analyzer_api_token);

    let worker_id = format!("worker-{}", uuid::Uuid::new_v4());
    let poll_interval = Duration::from_millis(config.worker_poll_interval_ms);
    let worker = WorkerLoop::new(db_pool, analyzer, config, worker_id);

    tracing::info!(worker_id = worker.worker_id(), "Worker ready, starting job processing loop");

    // Main processing loop
    loop {
        match worker.run_once().await {
            Ok(true) => {
                // Job handled, immediately check for the next one
                tracing::debug!("Job handled, checking for next job");
            }
            Ok(false) => {
                // No job available, sleep before next poll
                tracing::trace!("No jobs available, sleeping");
                sleep(poll_interval).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job, will retry");
                sleep(poll_interval).await;
            }
        }
    }
}
