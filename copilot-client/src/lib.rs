//! Copilot HTTP Client
//!
//! A type-safe HTTP client for the Copilot orchestrator API.
//!
//! The CLI, the external DAG scheduler and the pipeline runner all talk to
//! the orchestrator through this crate.
//!
//! # Example
//!
//! ```no_run
//! use copilot_client::OrchestratorClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     // Create a draft and validate it
//!     let draft = client
//!         .create_pipeline("load data/sales.csv into the sales table")
//!         .await?;
//!     let pipeline = client.validate_pipeline(draft.id).await?;
//!
//!     println!("Pipeline {} is {}", pipeline.id, pipeline.status);
//!     Ok(())
//! }
//! ```

pub mod error;
mod executions;
mod pipelines;

// Re-export commonly used types
pub use error::{ClientError, Result};

use copilot_core::dto::health::HealthReport;
use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Copilot orchestrator API
///
/// Methods are organized into logical groups:
/// - Pipeline lifecycle (create, validate, retire, list, get, catalog, consistency)
/// - Executions (trigger, status reports, listings)
/// - Health
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use copilot_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the orchestrator and both of its stores are reachable
    ///
    /// An unhealthy orchestrator answers 503 with the same report, so the
    /// report is returned either way when the body parses.
    pub async fn health(&self) -> Result<HealthReport> {
        let response = self.client.get(self.url("/health")).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<HealthReport>(&body) {
            Ok(report) => Ok(report),
            Err(_) if !status.is_success() => Err(ClientError::api_error(status.as_u16(), body)),
            Err(e) => Err(ClientError::ParseError(format!(
                "Failed to parse health report: {}",
                e
            ))),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Orchestrator answered {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Orchestrator answered {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OrchestratorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/health"), "http://localhost:8080/health");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = OrchestratorClient::with_client("http://localhost:8080", http_client);
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
