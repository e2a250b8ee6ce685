//! The external analysis unit, seen through a narrow trait.
//!
//! The queue never interprets analyzer failures by inspecting error text:
//! the adapter classifies every failure as retryable or terminal at the
//! boundary, and the worker only branches on that classification.

use std::future::Future;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::models::job::AlgorithmType;

/// Successful analyzer output, persisted verbatim as an `AnalysisResult`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisOutput {
    pub payload: Value,
    pub confidence_score: f64,
    #[serde(default)]
    pub quality_metrics: Value,
    pub algorithm_version: String,
}

/// Classified analyzer failure.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// Transient: worth another attempt if the retry budget allows.
    #[error("transient analyzer failure: {0}")]
    Retryable(String),

    /// Permanent (invalid image, unsupported algorithm): retrying cannot
    /// help, the job fails regardless of remaining budget.
    #[error("analysis cannot succeed: {0}")]
    Terminal(String),
}

impl AnalyzerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalyzerError::Retryable(_))
    }
}

/// An opaque unit of analysis work. The worker invokes it under a deadline;
/// implementations must classify their own failures.
pub trait Analyzer: Send + Sync {
    fn analyze(
        &self,
        image_id: &str,
        algorithm_type: AlgorithmType,
        parameters: &Value,
    ) -> impl Future<Output = Result<AnalysisOutput, AnalyzerError>> + Send;
}

/// HTTP-backed analyzer client.
pub struct HttpAnalyzer {
    http: Client,
    base_url: String,
    api_token: String,
}

impl HttpAnalyzer {
    pub fn new(base_url: &str, api_token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }
}

/// Map an analysis-service HTTP status to a classified failure. Client
/// errors (bad image reference, unsupported algorithm) are terminal; rate
/// limiting, timeouts, and server errors are transient.
fn classify_status(status: StatusCode, body: &str) -> AnalyzerError {
    let detail = format!("analysis service returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        AnalyzerError::Retryable(detail)
    } else {
        AnalyzerError::Terminal(detail)
    }
}

impl Analyzer for HttpAnalyzer {
    async fn analyze(
        &self,
        image_id: &str,
        algorithm_type: AlgorithmType,
        parameters: &Value,
    ) -> Result<AnalysisOutput, AnalyzerError> {
        let url = format!("{}/v1/analyze", self.base_url);

        let request_body = serde_json::json!({
            "image_id": image_id,
            "algorithm": algorithm_type.to_string(),
            "parameters": parameters,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AnalyzerError::Retryable(format!("analysis request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json::<AnalysisOutput>()
            .await
            .map_err(|e| AnalyzerError::Retryable(format!("malformed analyzer response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_terminal() {
        assert!(!classify_status(StatusCode::BAD_REQUEST, "invalid image").is_retryable());
        assert!(!classify_status(StatusCode::NOT_FOUND, "no such image").is_retryable());
        assert!(
            !classify_status(StatusCode::UNPROCESSABLE_ENTITY, "unsupported algorithm")
                .is_retryable()
        );
    }

    #[test]
    fn test_transient_statuses_are_retryable() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_retryable());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_retryable());
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "boom").is_retryable());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
    }

    #[test]
    fn test_classification_survives_error_display() {
        // The worker branches on the variant, not the text.
        let err = AnalyzerError::Terminal("unsupported algorithm: quantum".into());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("cannot succeed"));
    }
}
