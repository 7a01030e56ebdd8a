use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod artifact;
pub mod config;
pub mod db;
pub mod generator;
pub mod repository;
pub mod service;

use crate::artifact::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
use crate::config::{ArtifactBackend, Config, MetadataBackend};
use crate::generator::LlmCodeGenerator;
use crate::repository::{ExecutionRepository, InMemoryStore, PgStore, PipelineRepository};
use crate::service::guard::PromptGuard;
use crate::service::validator::Validator;
use crate::service::{ExecutionTracker, PipelineRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "copilot_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Copilot Orchestrator...");

    let config = Config::from_env()?;
    config.validate()?;

    let (pipelines, executions) = metadata_store(&config).await?;
    let artifacts = artifact_store(&config);

    if config.llm_api_key.is_none() {
        tracing::warn!("No LLM API key configured; pipeline creation will fail");
    }

    let generator = LlmCodeGenerator::new(
        config.llm_api_base.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        config.llm_timeout,
    )?;

    let registry = PipelineRegistry::new(
        pipelines.clone(),
        artifacts.clone(),
        Arc::new(generator),
        Validator::new()?,
        PromptGuard::new(config.guard_max_request_len)?,
    )
    .with_stale_validation_after(config.validation_stale_after);
    let tracker = ExecutionTracker::new(pipelines, executions, artifacts);

    // Build router with all API endpoints
    let app = api::create_router(api::AppState {
        registry: Arc::new(registry),
        tracker: Arc::new(tracker),
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn metadata_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn PipelineRepository>, Arc<dyn ExecutionRepository>)> {
    match config.metadata_store {
        MetadataBackend::Postgres => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(config).await?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool).await?;

            let store = Arc::new(PgStore::new(pool));
            Ok((store.clone(), store))
        }
        MetadataBackend::Memory => {
            tracing::warn!("Using the in-memory metadata store; records are lost on restart");
            let store = Arc::new(InMemoryStore::new());
            Ok((store.clone(), store))
        }
    }
}

fn artifact_store(config: &Config) -> Arc<dyn ArtifactStore> {
    match config.artifact_store {
        ArtifactBackend::Fs => {
            let store = FsArtifactStore::new(config.artifact_dir.clone());
            tracing::info!("Storing artifacts under {}", store.base_path().display());
            Arc::new(store)
        }
        ArtifactBackend::Memory => Arc::new(InMemoryArtifactStore::new()),
    }
}
