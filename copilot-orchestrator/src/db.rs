use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create pipelines table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id UUID PRIMARY KEY,
            seq BIGSERIAL NOT NULL,
            identity_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            request_text TEXT NOT NULL,
            code TEXT NOT NULL,
            spec JSONB NOT NULL,
            status VARCHAR(50) NOT NULL,
            violations JSONB NOT NULL DEFAULT '[]',
            artifact_ref TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one live pipeline per request identity, across processes
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_pipelines_live_identity
        ON pipelines(identity_hash)
        WHERE status <> 'validation_failed'
        "#,
    )
    .execute(pool)
    .await?;

    // Create executions table; records are never deleted, so no cascade
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id UUID PRIMARY KEY,
            seq BIGSERIAL NOT NULL,
            pipeline_id UUID NOT NULL REFERENCES pipelines(id),
            status VARCHAR(50) NOT NULL,
            requested_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT,
            input_payload JSONB NOT NULL DEFAULT '{}',
            output_payload JSONB
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipelines_created_at ON pipelines(created_at DESC, seq DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pipelines_status ON pipelines(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_executions_pipeline_id ON executions(pipeline_id, requested_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
