//! Execution Repository
//!
//! Handles all database operations related to pipeline executions.

use async_trait::async_trait;
use copilot_core::domain::execution::{ExecutionRecord, ExecutionStatus};
use copilot_core::domain::pipeline::PipelineStatus;
use uuid::Uuid;

use super::{ExecutionRepository, ExecutionUpdate, PgStore, StoreError};

const EXECUTION_COLUMNS: &str = r#"
    id, pipeline_id, status, requested_at, started_at, completed_at,
    error_message, input_payload, output_payload
"#;

#[async_trait]
impl ExecutionRepository for PgStore {
    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO executions (
                id, pipeline_id, status, requested_at, started_at, completed_at,
                error_message, input_payload, output_payload
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9
            WHERE EXISTS (
                SELECT 1 FROM pipelines WHERE id = $2 AND status = $10 FOR SHARE
            )
            "#,
        )
        .bind(record.id)
        .bind(record.pipeline_id)
        .bind(record.status.as_str())
        .bind(record.requested_at)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(&record.error_message)
        .bind(&record.input)
        .bind(&record.output)
        .bind(PipelineStatus::Active.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                Err(StoreError::PipelineNotActive(record.pipeline_id))
            }
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::MissingPipeline(record.pipeline_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>, StoreError> {
        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ExecutionRecord::try_from).transpose()
    }

    async fn list_for_pipeline(
        &self,
        pipeline_id: Uuid,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            r#"
            SELECT {EXECUTION_COLUMNS} FROM executions
            WHERE pipeline_id = $1
            ORDER BY requested_at DESC, seq DESC
            "#
        ))
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExecutionRecord::try_from).collect()
    }

    async fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            r#"
            SELECT {EXECUTION_COLUMNS} FROM executions
            WHERE status = $1
            ORDER BY requested_at ASC, seq ASC
            "#
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExecutionRecord::try_from).collect()
    }

    async fn apply_update(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        update: &ExecutionUpdate,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = $1,
                started_at = COALESCE($2, started_at),
                completed_at = COALESCE($3, completed_at),
                error_message = COALESCE($4, error_message),
                output_payload = COALESCE($5, output_payload)
            WHERE id = $6 AND status = $7
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.started_at)
        .bind(update.completed_at)
        .bind(&update.error_message)
        .bind(&update.output)
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    pipeline_id: Uuid,
    status: String,
    requested_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    error_message: Option<String>,
    input_payload: serde_json::Value,
    output_payload: Option<serde_json::Value>,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ExecutionStatus>()
            .map_err(|e| StoreError::corrupt(row.id, e))?;

        Ok(ExecutionRecord {
            id: row.id,
            pipeline_id: row.pipeline_id,
            status,
            requested_at: row.requested_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            input: row.input_payload,
            output: row.output_payload,
        })
    }
}
