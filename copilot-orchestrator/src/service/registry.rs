//! Pipeline Registry
//!
//! Turns natural-language requests into persisted pipelines and drives them
//! through their lifecycle:
//!
//! ```text
//! draft -> validating -> active -> retired
//!               \-> validation_failed
//! ```
//!
//! Generation failures and guard rejections are returned to the caller and
//! never persisted.

use std::sync::Arc;
use std::time::Duration;

use copilot_core::domain::pipeline::{PipelineRecord, PipelineStatus};
use copilot_core::domain::request;
use copilot_core::domain::spec::PipelineSpec;
use copilot_core::domain::validation::Violation;
use copilot_core::dto::error::FailureClass;
use copilot_core::dto::health::{ComponentHealth, HealthReport};
use copilot_core::dto::pipeline::{CatalogEntry, PipelineFilter};
use thiserror::Error;
use uuid::Uuid;

use super::guard::{Decision, GuardReport, PromptGuard};
use super::inflight::InflightTable;
use super::validator::{Validator, schedule};
use crate::artifact::{self, ArtifactStore, PutMode};
use crate::generator::{CodeGenerator, GeneratedPipeline, GenerationError};
use crate::repository::{PipelineRepository, StoreError};

/// Registry error type
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline {0} not found")]
    NotFound(Uuid),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request rejected by the prompt guard ({})", .0.summary())]
    RequestRejected(GuardReport),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Pipeline {pipeline_id} failed validation with {} violation(s)", .violations.len())]
    ValidationFailed {
        pipeline_id: Uuid,
        violations: Vec<Violation>,
    },

    #[error("Pipeline {id} is {status}; cannot {operation}")]
    InvalidState {
        id: Uuid,
        status: PipelineStatus,
        operation: &'static str,
    },

    #[error("Pipeline {id} is inconsistent: {reason}")]
    Inconsistent { id: Uuid, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub fn class(&self) -> FailureClass {
        match self {
            PipelineError::NotFound(_) | PipelineError::InvalidState { .. } => FailureClass::Client,
            PipelineError::InvalidRequest(_)
            | PipelineError::RequestRejected(_)
            | PipelineError::ValidationFailed { .. } => FailureClass::Input,
            PipelineError::Generation(_) => FailureClass::Transient,
            PipelineError::Inconsistent { .. } => FailureClass::Integrity,
            PipelineError::Store(e) => e.class(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Outcome of a `create` that later callers with the same identity reuse
#[derive(Debug, Clone)]
enum Settled {
    Record(PipelineRecord),
    GenerationFailed(GenerationError),
    Rejected(GuardReport),
}

impl Settled {
    fn into_result(self) -> Result<PipelineRecord> {
        match self {
            Settled::Record(record) => Ok(record),
            Settled::GenerationFailed(e) => Err(PipelineError::Generation(e)),
            Settled::Rejected(report) => Err(PipelineError::RequestRejected(report)),
        }
    }
}

pub struct PipelineRegistry {
    pipelines: Arc<dyn PipelineRepository>,
    artifacts: Arc<dyn ArtifactStore>,
    generator: Arc<dyn CodeGenerator>,
    validator: Validator,
    guard: PromptGuard,
    creations: InflightTable<Settled>,
    validations: InflightTable<()>,
    stale_validation_after: Duration,
}

/// Default age after which a `validating` record is taken over
pub const DEFAULT_STALE_VALIDATION_AFTER: Duration = Duration::from_secs(300);

impl PipelineRegistry {
    pub fn new(
        pipelines: Arc<dyn PipelineRepository>,
        artifacts: Arc<dyn ArtifactStore>,
        generator: Arc<dyn CodeGenerator>,
        validator: Validator,
        guard: PromptGuard,
    ) -> Self {
        Self {
            pipelines,
            artifacts,
            generator,
            validator,
            guard,
            creations: InflightTable::new(),
            validations: InflightTable::new(),
            stale_validation_after: DEFAULT_STALE_VALIDATION_AFTER,
        }
    }

    /// How long a `validating` record must sit untouched before another
    /// validation takes it over
    pub fn with_stale_validation_after(mut self, after: Duration) -> Self {
        self.stale_validation_after = after;
        self
    }

    /// Create a draft pipeline from a request, or return the live one for it
    pub async fn create(&self, request_text: &str) -> Result<PipelineRecord> {
        let identity = request::normalize(request_text);
        if identity.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "Request text cannot be empty".to_string(),
            ));
        }
        let hash = request::identity_hash(&identity);

        let mut slot = self.creations.acquire(&hash).await;
        if let Some(settled) = slot.settled() {
            tracing::debug!("Reusing in-flight outcome for request {}", &hash[..12]);
            return settled.into_result();
        }

        if let Some(existing) = self.pipelines.find_live_by_identity(&hash).await? {
            tracing::info!(
                "Request matches existing pipeline {} ({})",
                existing.name,
                existing.id
            );
            return Ok(existing);
        }

        let report = self.guard.analyze(request_text);
        match report.decision {
            Decision::Block => {
                tracing::warn!("Request {} blocked: {}", &hash[..12], report.summary());
                slot.publish(Settled::Rejected(report.clone()));
                return Err(PipelineError::RequestRejected(report));
            }
            Decision::Review => {
                tracing::warn!("Request {} flagged for review: {}", &hash[..12], report.summary());
            }
            Decision::Allow => {}
        }

        let generated = match self.generator.generate(report.cleaned.trim()).await {
            Ok(generated) => generated,
            Err(e) => {
                tracing::warn!("Generation failed for request {}: {}", &hash[..12], e);
                slot.publish(Settled::GenerationFailed(e.clone()));
                return Err(e.into());
            }
        };

        let record = draft_record(hash, &identity, report.cleaned.trim(), generated);

        let record = match self.pipelines.insert_pipeline(&record).await {
            Ok(()) => {
                tracing::info!("Pipeline created: {} ({})", record.name, record.id);
                record
            }
            // Another process created the same pipeline first
            Err(StoreError::DuplicateIdentity(hash)) => self
                .pipelines
                .find_live_by_identity(&hash)
                .await?
                .ok_or(StoreError::DuplicateIdentity(hash))?,
            Err(e) => return Err(e.into()),
        };

        slot.publish(Settled::Record(record.clone()));
        Ok(record)
    }

    /// Validate a draft and activate it, or record why it failed
    pub async fn validate(&self, id: Uuid) -> Result<PipelineRecord> {
        let _lock = self.validations.acquire(&id.to_string()).await;

        let record = self.get(id).await?;
        let mode = match record.status {
            PipelineStatus::Active => {
                tracing::debug!("Pipeline {} is already active", id);
                return Ok(record);
            }
            PipelineStatus::Draft => {
                if !self
                    .pipelines
                    .transition(id, PipelineStatus::Draft, PipelineStatus::Validating)
                    .await?
                {
                    return Err(self.lost_race(id, "validate").await);
                }
                PutMode::CreateNew
            }
            // Not ours: either another process is validating or an earlier attempt died
            PipelineStatus::Validating => {
                let cutoff = chrono::Duration::from_std(self.stale_validation_after)
                    .ok()
                    .and_then(|after| chrono::Utc::now().checked_sub_signed(after))
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
                if !self.pipelines.claim_stale_validation(id, cutoff).await? {
                    return Err(self.lost_race(id, "validate").await);
                }
                tracing::warn!("Pipeline {} was left validating; taking it over", id);
                PutMode::Replace
            }
            status => {
                return Err(PipelineError::InvalidState {
                    id,
                    status,
                    operation: "validate",
                });
            }
        };

        if let Err(violations) = self.validator.validate(&record.spec, &record.code) {
            if !self.pipelines.reject(id, &violations).await? {
                return Err(self.lost_race(id, "reject").await);
            }
            tracing::info!(
                "Pipeline {} failed validation with {} violation(s)",
                id,
                violations.len()
            );
            return Err(PipelineError::ValidationFailed {
                pipeline_id: id,
                violations,
            });
        }

        let location = self.artifacts.put(id, &record.code, mode).await?;
        if !self.pipelines.activate(id, &location).await? {
            return Err(self.lost_race(id, "activate").await);
        }

        tracing::info!("Pipeline {} is active (artifact {})", id, location);

        self.get(id).await
    }

    /// Retire an active pipeline; the record and artifact are kept
    pub async fn retire(&self, id: Uuid) -> Result<PipelineRecord> {
        let record = self.get(id).await?;
        if record.status != PipelineStatus::Active {
            return Err(PipelineError::InvalidState {
                id,
                status: record.status,
                operation: "retire",
            });
        }

        if !self
            .pipelines
            .transition(id, PipelineStatus::Active, PipelineStatus::Retired)
            .await?
        {
            return Err(self.lost_race(id, "retire").await);
        }

        tracing::info!("Pipeline retired: {} ({})", record.name, id);

        self.get(id).await
    }

    /// List pipelines, newest first
    pub async fn list(&self, filter: &PipelineFilter) -> Result<Vec<PipelineRecord>> {
        let pipelines = self.pipelines.list_pipelines(filter).await?;
        Ok(pipelines)
    }

    /// Get a pipeline by ID
    pub async fn get(&self, id: Uuid) -> Result<PipelineRecord> {
        let pipeline = self
            .pipelines
            .find_pipeline(id)
            .await?
            .ok_or(PipelineError::NotFound(id))?;

        Ok(pipeline)
    }

    /// Check that a pipeline's stored artifact matches its recorded code
    pub async fn check_consistency(&self, id: Uuid) -> Result<()> {
        let record = self.get(id).await?;

        match artifact::verify(self.artifacts.as_ref(), &record).await? {
            None => Ok(()),
            Some(reason) => {
                tracing::error!("Pipeline {} is inconsistent: {}", id, reason);
                Err(PipelineError::Inconsistent { id, reason })
            }
        }
    }

    /// Active pipelines that run on a schedule
    pub async fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        let active = self
            .list(&PipelineFilter::default().with_status(PipelineStatus::Active))
            .await?;

        let entries = active
            .into_iter()
            .filter_map(|record| {
                let schedule = record.spec.as_etl()?.schedule.clone()?;
                if schedule::is_manual(Some(&schedule)) {
                    return None;
                }
                Some(CatalogEntry {
                    id: record.id,
                    name: record.name,
                    description: record.description,
                    schedule,
                })
            })
            .collect();

        Ok(entries)
    }

    /// Reachability of the metadata and artifact stores
    pub async fn health(&self) -> HealthReport {
        let metadata_store = match self.pipelines.ping().await {
            Ok(()) => ComponentHealth::up(),
            Err(e) => ComponentHealth::down(e.to_string()),
        };
        let artifact_store = match self.artifacts.ping().await {
            Ok(()) => ComponentHealth::up(),
            Err(e) => ComponentHealth::down(e.to_string()),
        };

        HealthReport {
            metadata_store,
            artifact_store,
        }
    }

    /// Error for a compare-and-set that found the record in another state
    async fn lost_race(&self, id: Uuid, operation: &'static str) -> PipelineError {
        match self.pipelines.find_pipeline(id).await {
            Ok(Some(current)) => PipelineError::InvalidState {
                id,
                status: current.status,
                operation,
            },
            Ok(None) => PipelineError::NotFound(id),
            Err(e) => e.into(),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn draft_record(
    identity_hash: String,
    identity: &str,
    request_text: &str,
    generated: GeneratedPipeline,
) -> PipelineRecord {
    let (name, description) = match &generated.spec {
        PipelineSpec::Etl(spec) => (spec.name.trim().to_string(), spec.description.clone()),
        PipelineSpec::Unrecognized(_) => (
            format!("pipeline-{}", &identity_hash[..12]),
            identity.to_string(),
        ),
    };

    let now = chrono::Utc::now();
    PipelineRecord {
        id: Uuid::new_v4(),
        identity_hash,
        name,
        description,
        request_text: request_text.to_string(),
        code: generated.code,
        spec: generated.spec,
        status: PipelineStatus::Draft,
        violations: Vec::new(),
        artifact_ref: None,
        created_at: now,
        updated_at: now,
    }
}
