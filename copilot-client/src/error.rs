//! Error types for the Copilot client

use copilot_core::domain::validation::Violation;
use copilot_core::dto::error::{ErrorBody, FailureClass};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Copilot client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Failure class reported by the orchestrator, when the body carried one
        class: Option<FailureClass>,
        /// Error message from the API
        message: String,
        /// Validator findings attached to a 422
        violations: Vec<Violation>,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Create an API error from status code and response body
    ///
    /// Bodies in the orchestrator's error format keep their class and
    /// violations; anything else becomes the message verbatim.
    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => Self::ApiError {
                status,
                class: Some(parsed.class),
                message: parsed.error,
                violations: parsed.violations,
            },
            Err(_) => Self::ApiError {
                status,
                class: None,
                message: body,
                violations: Vec::new(),
            },
        }
    }

    /// Failure class of an API error
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            Self::ApiError { class, .. } => *class,
            Self::RequestFailed(_) => Some(FailureClass::Transient),
            _ => None,
        }
    }

    /// Validator findings carried by the error, if any
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::ApiError { violations, .. } => violations,
            _ => &[],
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        self.class() == Some(FailureClass::Transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copilot_core::domain::validation::Rule;

    #[test]
    fn test_api_error_parses_error_body() {
        let body = r#"{
            "error": "pipeline failed validation",
            "class": "input",
            "violations": [
                { "rule": "undeclared_resource", "message": "table not declared", "fragment": "customers" }
            ]
        }"#;

        let err = ClientError::api_error(422, body);

        assert_eq!(err.class(), Some(FailureClass::Input));
        assert_eq!(err.violations().len(), 1);
        assert_eq!(err.violations()[0].rule, Rule::UndeclaredResource);
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("pipeline failed validation"));
    }

    #[test]
    fn test_api_error_keeps_plain_text() {
        let err = ClientError::api_error(502, "Bad Gateway");

        assert_eq!(err.class(), None);
        assert!(err.violations().is_empty());
        assert!(err.is_server_error());
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        let err = ClientError::api_error(503, r#"{"error":"store down","class":"transient"}"#);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found() {
        let err = ClientError::api_error(404, r#"{"error":"pipeline not found","class":"client"}"#);
        assert!(err.is_not_found());
        assert!(!ClientError::ParseError("x".to_string()).is_not_found());
    }
}
