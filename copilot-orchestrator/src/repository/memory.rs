//! In-memory metadata store
//!
//! Implements both repository traits over a single lock so the same
//! uniqueness, foreign-key and ordering rules as the Postgres schema hold.
//! Used by tests and by `METADATA_STORE=memory` for local development.

use std::sync::Mutex;

use async_trait::async_trait;
use copilot_core::domain::execution::{ExecutionRecord, ExecutionStatus};
use copilot_core::domain::pipeline::{PipelineRecord, PipelineStatus};
use copilot_core::domain::validation::Violation;
use copilot_core::dto::pipeline::PipelineFilter;
use uuid::Uuid;

use super::{ExecutionRepository, ExecutionUpdate, PipelineRepository, StoreError};

/// Rows are kept in insertion order; the index doubles as the `seq` tie-breaker.
#[derive(Default)]
struct Tables {
    pipelines: Vec<PipelineRecord>,
    executions: Vec<ExecutionRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Newest first, later insertion winning ties
fn newest_first<T>(rows: &[T], key: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<&T> {
    let mut indexed: Vec<(usize, &T)> = rows.iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| key(b).cmp(&key(a)).then(ib.cmp(ia)));
    indexed.into_iter().map(|(_, row)| row).collect()
}

#[async_trait]
impl PipelineRepository for InMemoryStore {
    async fn insert_pipeline(&self, record: &PipelineRecord) -> Result<(), StoreError> {
        let mut tables = self.tables();

        let duplicate = tables.pipelines.iter().any(|p| {
            p.id == record.id
                || (p.identity_hash == record.identity_hash
                    && !p.status.is_failed()
                    && !record.status.is_failed())
        });
        if duplicate {
            return Err(StoreError::DuplicateIdentity(record.identity_hash.clone()));
        }

        tables.pipelines.push(record.clone());
        Ok(())
    }

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<PipelineRecord>, StoreError> {
        Ok(self.tables().pipelines.iter().find(|p| p.id == id).cloned())
    }

    async fn find_live_by_identity(
        &self,
        identity_hash: &str,
    ) -> Result<Option<PipelineRecord>, StoreError> {
        let tables = self.tables();
        let live = newest_first(&tables.pipelines, |p| p.created_at)
            .into_iter()
            .find(|p| p.identity_hash == identity_hash && !p.status.is_failed())
            .cloned();
        Ok(live)
    }

    async fn list_pipelines(
        &self,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineRecord>, StoreError> {
        let needle = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let tables = self.tables();
        let matching = newest_first(&tables.pipelines, |p| p.created_at)
            .into_iter()
            .filter(|p| filter.status.is_none_or(|status| p.status == status))
            .filter(|p| match &needle {
                Some(needle) => {
                    p.name.to_lowercase().contains(needle)
                        || p.description.to_lowercase().contains(needle)
                }
                None => true,
            })
            .take(filter.limit.map_or(usize::MAX, |limit| limit as usize))
            .cloned()
            .collect();

        Ok(matching)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PipelineStatus,
        to: PipelineStatus,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        match tables
            .pipelines
            .iter_mut()
            .find(|p| p.id == id && p.status == from)
        {
            Some(record) => {
                record.status = to;
                record.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn claim_stale_validation(
        &self,
        id: Uuid,
        older_than: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        match tables.pipelines.iter_mut().find(|p| {
            p.id == id && p.status == PipelineStatus::Validating && p.updated_at < older_than
        }) {
            Some(record) => {
                record.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn activate(&self, id: Uuid, artifact_ref: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        match tables
            .pipelines
            .iter_mut()
            .find(|p| p.id == id && p.status == PipelineStatus::Validating)
        {
            Some(record) => {
                record.status = PipelineStatus::Active;
                record.artifact_ref = Some(artifact_ref.to_string());
                record.violations.clear();
                record.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reject(&self, id: Uuid, violations: &[Violation]) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        match tables
            .pipelines
            .iter_mut()
            .find(|p| p.id == id && p.status == PipelineStatus::Validating)
        {
            Some(record) => {
                record.status = PipelineStatus::ValidationFailed;
                record.violations = violations.to_vec();
                record.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryStore {
    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let mut tables = self.tables();

        match tables.pipelines.iter().find(|p| p.id == record.pipeline_id) {
            None => return Err(StoreError::MissingPipeline(record.pipeline_id)),
            Some(pipeline) if pipeline.status != PipelineStatus::Active => {
                return Err(StoreError::PipelineNotActive(record.pipeline_id));
            }
            Some(_) => {}
        }

        tables.executions.push(record.clone());
        Ok(())
    }

    async fn find_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>, StoreError> {
        Ok(self.tables().executions.iter().find(|e| e.id == id).cloned())
    }

    async fn list_for_pipeline(
        &self,
        pipeline_id: Uuid,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let tables = self.tables();
        let executions = newest_first(&tables.executions, |e| e.requested_at)
            .into_iter()
            .filter(|e| e.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        Ok(executions)
    }

    async fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let tables = self.tables();
        let mut executions: Vec<ExecutionRecord> =
            newest_first(&tables.executions, |e| e.requested_at)
                .into_iter()
                .filter(|e| e.status == status)
                .cloned()
                .collect();
        executions.reverse();
        Ok(executions)
    }

    async fn apply_update(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        update: &ExecutionUpdate,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let Some(record) = tables
            .executions
            .iter_mut()
            .find(|e| e.id == id && e.status == expected)
        else {
            return Ok(false);
        };

        record.status = update.status;
        if update.started_at.is_some() {
            record.started_at = update.started_at;
        }
        if update.completed_at.is_some() {
            record.completed_at = update.completed_at;
        }
        if update.error_message.is_some() {
            record.error_message = update.error_message.clone();
        }
        if update.output.is_some() {
            record.output = update.output.clone();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copilot_core::domain::spec::PipelineSpec;

    fn record(hash: &str, name: &str, status: PipelineStatus) -> PipelineRecord {
        let now = chrono::Utc::now();
        PipelineRecord {
            id: Uuid::new_v4(),
            identity_hash: hash.to_string(),
            name: name.to_string(),
            description: format!("{name} description"),
            request_text: name.to_string(),
            code: "return {}".to_string(),
            spec: PipelineSpec::Unrecognized(serde_json::Value::Null),
            status,
            violations: vec![],
            artifact_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_live_identity_is_unique() {
        let store = InMemoryStore::new();
        store
            .insert_pipeline(&record("h1", "a", PipelineStatus::Draft))
            .await
            .unwrap();

        let err = store
            .insert_pipeline(&record("h1", "b", PipelineStatus::Draft))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateIdentity(_)));
    }

    #[tokio::test]
    async fn test_failed_record_does_not_block_identity() {
        let store = InMemoryStore::new();
        let failed = record("h1", "a", PipelineStatus::ValidationFailed);
        store.insert_pipeline(&failed).await.unwrap();
        store
            .insert_pipeline(&record("h1", "b", PipelineStatus::Draft))
            .await
            .unwrap();

        let live = store.find_live_by_identity("h1").await.unwrap().unwrap();
        assert_eq!(live.name, "b");
    }

    #[tokio::test]
    async fn test_list_is_newest_first_with_stable_ties() {
        let store = InMemoryStore::new();
        let q = record("h1", "q", PipelineStatus::Draft);
        let mut p = record("h2", "p", PipelineStatus::Draft);
        // Identical timestamps: insertion order decides
        p.created_at = q.created_at;
        store.insert_pipeline(&q).await.unwrap();
        store.insert_pipeline(&p).await.unwrap();

        let names: Vec<String> = store
            .list_pipelines(&PipelineFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["p", "q"]);
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_text() {
        let store = InMemoryStore::new();
        store
            .insert_pipeline(&record("h1", "sales_load", PipelineStatus::Active))
            .await
            .unwrap();
        store
            .insert_pipeline(&record("h2", "orders_load", PipelineStatus::Draft))
            .await
            .unwrap();

        let active = store
            .list_pipelines(&PipelineFilter::default().with_status(PipelineStatus::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "sales_load");

        let by_text = store
            .list_pipelines(&PipelineFilter::default().with_query("ORDERS"))
            .await
            .unwrap();
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].name, "orders_load");
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = InMemoryStore::new();
        let draft = record("h1", "a", PipelineStatus::Draft);
        store.insert_pipeline(&draft).await.unwrap();

        assert!(
            store
                .transition(draft.id, PipelineStatus::Draft, PipelineStatus::Validating)
                .await
                .unwrap()
        );
        assert!(
            !store
                .transition(draft.id, PipelineStatus::Draft, PipelineStatus::Validating)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_stale_validation_is_claimed_once() {
        let store = InMemoryStore::new();
        let mut validating = record("h1", "a", PipelineStatus::Validating);
        validating.updated_at = chrono::Utc::now() - chrono::Duration::minutes(10);
        store.insert_pipeline(&validating).await.unwrap();

        let cutoff = chrono::Utc::now() - chrono::Duration::minutes(5);
        assert!(store.claim_stale_validation(validating.id, cutoff).await.unwrap());
        // The claim refreshed updated_at
        assert!(!store.claim_stale_validation(validating.id, cutoff).await.unwrap());
    }

    #[tokio::test]
    async fn test_orphan_execution_rejected() {
        let store = InMemoryStore::new();
        let execution = ExecutionRecord {
            id: Uuid::new_v4(),
            pipeline_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            requested_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            input: serde_json::json!({}),
            output: None,
        };

        let err = store.insert_execution(&execution).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingPipeline(_)));
    }

    #[tokio::test]
    async fn test_execution_requires_active_pipeline() {
        let store = InMemoryStore::new();
        let pipeline = record("h1", "sales_load", PipelineStatus::Active);
        store.insert_pipeline(&pipeline).await.unwrap();

        let execution = |pipeline_id| ExecutionRecord {
            id: Uuid::new_v4(),
            pipeline_id,
            status: ExecutionStatus::Pending,
            requested_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            input: serde_json::json!({}),
            output: None,
        };

        store.insert_execution(&execution(pipeline.id)).await.unwrap();

        store
            .transition(pipeline.id, PipelineStatus::Active, PipelineStatus::Retired)
            .await
            .unwrap();
        let err = store
            .insert_execution(&execution(pipeline.id))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::PipelineNotActive(id) if id == pipeline.id));
        assert_eq!(store.list_for_pipeline(pipeline.id).await.unwrap().len(), 1);
    }
}
