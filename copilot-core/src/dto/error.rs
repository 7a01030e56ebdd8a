//! Error DTOs
//!
//! Every failed API call answers with an [`ErrorBody`] whose `class` tells the
//! caller whether to retry, fix its input, or treat the call as a bug.

use serde::{Deserialize, Serialize};

use crate::domain::validation::Violation;

/// Coarse failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Store or generator unavailable; retry later
    Transient,
    /// The request or its generated pipeline is unacceptable; revise it
    Input,
    /// Unknown identifier or operation not allowed in the current state
    Client,
    /// Stored data disagrees with itself
    Integrity,
}

/// JSON body of an error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub class: FailureClass,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}
