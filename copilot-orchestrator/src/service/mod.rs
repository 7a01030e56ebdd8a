//! Service Module
//!
//! Business logic layer between the API handlers and the stores.

pub mod guard;
pub mod inflight;
pub mod registry;
pub mod tracker;
pub mod validator;

pub use registry::{PipelineError, PipelineRegistry};
pub use tracker::{ExecutionError, ExecutionTracker};
