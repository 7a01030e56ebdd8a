//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used for communication between the orchestrator
//! and its clients (CLI, external schedulers, runners).

pub mod error;
pub mod execution;
pub mod health;
pub mod pipeline;
