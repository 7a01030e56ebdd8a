//! Pipeline Repository
//!
//! Handles all database operations related to pipelines.

use async_trait::async_trait;
use copilot_core::domain::pipeline::{PipelineRecord, PipelineStatus};
use copilot_core::domain::spec::PipelineSpec;
use copilot_core::domain::validation::Violation;
use copilot_core::dto::pipeline::PipelineFilter;
use uuid::Uuid;

use super::{PgStore, PipelineRepository, StoreError};

const PIPELINE_COLUMNS: &str = r#"
    id, identity_hash, name, description, request_text, code, spec,
    status, violations, artifact_ref, created_at, updated_at
"#;

#[async_trait]
impl PipelineRepository for PgStore {
    async fn insert_pipeline(&self, record: &PipelineRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO pipelines (
                id, identity_hash, name, description, request_text, code, spec,
                status, violations, artifact_ref, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(&record.identity_hash)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.request_text)
        .bind(&record.code)
        .bind(serde_json::to_value(&record.spec)?)
        .bind(record.status.as_str())
        .bind(serde_json::to_value(&record.violations)?)
        .bind(&record.artifact_ref)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateIdentity(record.identity_hash.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<PipelineRecord>, StoreError> {
        let row = sqlx::query_as::<_, PipelineRow>(&format!(
            "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PipelineRecord::try_from).transpose()
    }

    async fn find_live_by_identity(
        &self,
        identity_hash: &str,
    ) -> Result<Option<PipelineRecord>, StoreError> {
        let row = sqlx::query_as::<_, PipelineRow>(&format!(
            r#"
            SELECT {PIPELINE_COLUMNS} FROM pipelines
            WHERE identity_hash = $1 AND status <> $2
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#
        ))
        .bind(identity_hash)
        .bind(PipelineStatus::ValidationFailed.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PipelineRecord::try_from).transpose()
    }

    async fn list_pipelines(
        &self,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineRecord>, StoreError> {
        let pattern = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let rows = sqlx::query_as::<_, PipelineRow>(&format!(
            r#"
            SELECT {PIPELINE_COLUMNS} FROM pipelines
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR name ILIKE $2 OR description ILIKE $2)
            ORDER BY created_at DESC, seq DESC
            LIMIT $3
            "#
        ))
        .bind(filter.status.map(PipelineStatus::as_str))
        .bind(pattern)
        .bind(filter.limit.map(i64::from))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PipelineRecord::try_from).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PipelineStatus,
        to: PipelineStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET status = $1, updated_at = $2
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(to.as_str())
        .bind(chrono::Utc::now())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_stale_validation(
        &self,
        id: Uuid,
        older_than: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET updated_at = $1
            WHERE id = $2 AND status = $3 AND updated_at < $4
            "#,
        )
        .bind(chrono::Utc::now())
        .bind(id)
        .bind(PipelineStatus::Validating.as_str())
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn activate(&self, id: Uuid, artifact_ref: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET status = $1, artifact_ref = $2, violations = '[]', updated_at = $3
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(PipelineStatus::Active.as_str())
        .bind(artifact_ref)
        .bind(chrono::Utc::now())
        .bind(id)
        .bind(PipelineStatus::Validating.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reject(&self, id: Uuid, violations: &[Violation]) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET status = $1, violations = $2, updated_at = $3
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(PipelineStatus::ValidationFailed.as_str())
        .bind(serde_json::to_value(violations)?)
        .bind(chrono::Utc::now())
        .bind(id)
        .bind(PipelineStatus::Validating.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Escape `%`, `_` and `\` so user text matches literally inside ILIKE
fn escape_like(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    identity_hash: String,
    name: String,
    description: String,
    request_text: String,
    code: String,
    spec: serde_json::Value,
    status: String,
    violations: serde_json::Value,
    artifact_ref: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PipelineRow> for PipelineRecord {
    type Error = StoreError;

    fn try_from(row: PipelineRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<PipelineStatus>()
            .map_err(|e| StoreError::corrupt(row.id, e))?;
        let violations = serde_json::from_value(row.violations)
            .map_err(|e| StoreError::corrupt(row.id, format!("violations: {e}")))?;

        Ok(PipelineRecord {
            id: row.id,
            identity_hash: row.identity_hash,
            name: row.name,
            description: row.description,
            request_text: row.request_text,
            code: row.code,
            spec: PipelineSpec::from_value(row.spec),
            status,
            violations,
            artifact_ref: row.artifact_ref,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("sales"), "sales");
    }
}
