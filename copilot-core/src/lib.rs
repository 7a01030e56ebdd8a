//! Copilot Core
//!
//! Core types and abstractions for the ETL pipeline co-pilot.
//!
//! This crate contains:
//! - Domain types: Core business entities (PipelineRecord, ExecutionRecord, PipelineSpec, etc.)
//! - DTOs: Data transfer objects for communication between the orchestrator and its clients

pub mod domain;
pub mod dto;
