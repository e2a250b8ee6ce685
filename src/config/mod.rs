use std::time::Duration;

use serde::Deserialize;

use crate::models::job::AlgorithmType;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Base URL of the image analysis service
    pub analyzer_url: String,

    /// Bearer token for the analysis service
    pub analyzer_api_token: String,

    /// Worker sleep between empty polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Retry budget applied to newly enqueued jobs
    #[serde(default = "default_max_retries")]
    pub default_max_retries: i32,

    /// Result cache TTL, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,

    /// Processing budgets per algorithm tier, in seconds
    #[serde(default = "default_timeout_basic_secs")]
    pub timeout_basic_secs: u64,
    #[serde(default = "default_timeout_advanced_secs")]
    pub timeout_advanced_secs: u64,
    #[serde(default = "default_timeout_ai_powered_secs")]
    pub timeout_ai_powered_secs: u64,

    /// Retry backoff: base delay doubled per attempt, capped
    #[serde(default = "default_backoff_base_secs")]
    pub retry_backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap_secs")]
    pub retry_backoff_cap_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_retries() -> i32 {
    3
}

fn default_cache_ttl_secs() -> i64 {
    3600
}

fn default_timeout_basic_secs() -> u64 {
    30
}

fn default_timeout_advanced_secs() -> u64 {
    120
}

fn default_timeout_ai_powered_secs() -> u64 {
    300
}

fn default_backoff_base_secs() -> u64 {
    5
}

fn default_backoff_cap_secs() -> u64 {
    300
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Hard processing deadline for one analyzer invocation, derived from
    /// the algorithm tier.
    pub fn processing_timeout(&self, algorithm: AlgorithmType) -> Duration {
        let secs = match algorithm {
            AlgorithmType::Basic => self.timeout_basic_secs,
            AlgorithmType::Advanced => self.timeout_advanced_secs,
            AlgorithmType::AiPowered => self.timeout_ai_powered_secs,
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: default_bind_addr(),
            database_url: "postgres://localhost/test".into(),
            analyzer_url: "http://localhost:9000".into(),
            analyzer_api_token: "token".into(),
            worker_poll_interval_ms: default_poll_interval_ms(),
            default_max_retries: default_max_retries(),
            cache_ttl_secs: default_cache_ttl_secs(),
            timeout_basic_secs: default_timeout_basic_secs(),
            timeout_advanced_secs: default_timeout_advanced_secs(),
            timeout_ai_powered_secs: default_timeout_ai_powered_secs(),
            retry_backoff_base_secs: default_backoff_base_secs(),
            retry_backoff_cap_secs: default_backoff_cap_secs(),
        }
    }

    #[test]
    fn test_heavier_algorithms_get_longer_budgets() {
        let config = test_config();
        let basic = config.processing_timeout(AlgorithmType::Basic);
        let advanced = config.processing_timeout(AlgorithmType::Advanced);
        let ai = config.processing_timeout(AlgorithmType::AiPowered);
        assert!(basic < advanced);
        assert!(advanced < ai);
    }
}
