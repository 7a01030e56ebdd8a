//! Generator Module
//!
//! The code generator turns a natural-language request into a structured
//! spec plus Lua code. It is an external capability: the registry only sees
//! the [`CodeGenerator`] trait.

mod llm;

pub use llm::LlmCodeGenerator;

use async_trait::async_trait;
use copilot_core::domain::spec::PipelineSpec;
use thiserror::Error;

/// A spec and code pair returned by a generator
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPipeline {
    pub spec: PipelineSpec,
    pub code: String,
}

/// Generator failures; never retried by the registry
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Code generator is not configured: {0}")]
    NotConfigured(String),

    #[error("Code generator unreachable: {0}")]
    Unreachable(String),

    #[error("Code generator returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Code generator returned unusable output: {0}")]
    InvalidOutput(String),
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, request_text: &str) -> Result<GeneratedPipeline, GenerationError>;
}
