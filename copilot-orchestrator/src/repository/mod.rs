//! Repository Module
//!
//! Data access layer for the orchestrator (the metadata store).
//! Repositories are trait-based so the registry and tracker can run against
//! Postgres in production and an in-memory store in tests and local development.

mod error;
pub mod execution;
pub mod memory;
pub mod pipeline;

pub use error::StoreError;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use copilot_core::domain::execution::{ExecutionRecord, ExecutionStatus};
use copilot_core::domain::pipeline::{PipelineRecord, PipelineStatus};
use copilot_core::domain::validation::Violation;
use copilot_core::dto::pipeline::PipelineFilter;
use sqlx::PgPool;
use uuid::Uuid;

/// Pipeline persistence
///
/// Status writes are compare-and-set: they only apply when the stored status
/// still equals the expected one and report whether they did.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Insert a new record
    ///
    /// Fails with [`StoreError::DuplicateIdentity`] when a non-failed record
    /// with the same identity hash already exists.
    async fn insert_pipeline(&self, record: &PipelineRecord) -> Result<(), StoreError>;

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<PipelineRecord>, StoreError>;

    /// Most recent record for an identity hash that is not `validation_failed`
    async fn find_live_by_identity(
        &self,
        identity_hash: &str,
    ) -> Result<Option<PipelineRecord>, StoreError>;

    /// Records matching `filter`, newest first
    async fn list_pipelines(&self, filter: &PipelineFilter)
    -> Result<Vec<PipelineRecord>, StoreError>;

    /// Move `id` from `from` to `to`
    async fn transition(
        &self,
        id: Uuid,
        from: PipelineStatus,
        to: PipelineStatus,
    ) -> Result<bool, StoreError>;

    /// Take over a `validating` record last touched before `older_than`
    ///
    /// Refreshes `updated_at` so only one caller wins the claim.
    async fn claim_stale_validation(
        &self,
        id: Uuid,
        older_than: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, StoreError>;

    /// Move `id` from `validating` to `active`, recording its artifact
    async fn activate(&self, id: Uuid, artifact_ref: &str) -> Result<bool, StoreError>;

    /// Move `id` from `validating` to `validation_failed`, recording why
    async fn reject(&self, id: Uuid, violations: &[Violation]) -> Result<bool, StoreError>;

    /// Cheap reachability check
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Fields written by a status report
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,
    pub output: Option<serde_json::Value>,
}

/// Execution persistence
///
/// Executions are append-only: there is no delete.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Insert a new execution while its pipeline is active
    ///
    /// The status check and the insert are one atomic step. Fails with
    /// [`StoreError::MissingPipeline`] when the referenced pipeline does not
    /// exist and [`StoreError::PipelineNotActive`] when it is in any other
    /// status at insert time.
    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    async fn find_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Executions of one pipeline, most recently requested first
    async fn list_for_pipeline(&self, pipeline_id: Uuid)
    -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Executions in `status`, oldest request first
    async fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Apply `update` if the execution is still in `expected`
    ///
    /// Timestamps, error and output are only overwritten when set in `update`.
    async fn apply_update(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        update: &ExecutionUpdate,
    ) -> Result<bool, StoreError>;
}

/// Postgres-backed metadata store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
