//! Core domain types
//!
//! This module contains the core domain structures used across copilot services.
//! These types represent the fundamental business entities and are shared between
//! the orchestrator (for persistence) and its clients (CLI, schedulers, runners).

pub mod execution;
pub mod pipeline;
pub mod request;
pub mod spec;
pub mod validation;
