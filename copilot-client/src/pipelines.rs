//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use copilot_core::domain::pipeline::PipelineRecord;
use copilot_core::dto::pipeline::{CatalogEntry, CreatePipeline, PipelineFilter};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Lifecycle
    // =============================================================================

    /// Create a draft pipeline from a natural-language request
    ///
    /// Repeating a request (after normalization) returns the existing record.
    ///
    /// # Example
    /// ```no_run
    /// # use copilot_client::OrchestratorClient;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let draft = client
    ///     .create_pipeline("load data/sales.csv into the sales table")
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_pipeline(&self, request_text: impl Into<String>) -> Result<PipelineRecord> {
        let req = CreatePipeline {
            request_text: request_text.into(),
        };
        let response = self
            .client
            .post(self.url("/pipeline/create"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Validate a draft, activating it on success
    ///
    /// A failed validation comes back as a 422 `ApiError` whose
    /// `violations()` lists the findings.
    pub async fn validate_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineRecord> {
        let url = self.url(&format!("/pipeline/{}/validate", pipeline_id));
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Retire an active pipeline
    pub async fn retire_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineRecord> {
        let url = self.url(&format!("/pipeline/{}/retire", pipeline_id));
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// List pipelines, newest first
    pub async fn list_pipelines(&self, filter: &PipelineFilter) -> Result<Vec<PipelineRecord>> {
        let response = self
            .client
            .get(self.url("/pipeline/list"))
            .query(filter)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a pipeline by ID
    pub async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineRecord> {
        let url = self.url(&format!("/pipeline/{}", pipeline_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Active pipelines with a schedule, for the DAG scheduler
    pub async fn pipeline_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let response = self.client.get(self.url("/pipeline/catalog")).send().await?;

        self.handle_response(response).await
    }

    /// Check that a pipeline's stored artifact matches its code
    pub async fn check_consistency(&self, pipeline_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/pipeline/{}/consistency", pipeline_id));
        let response = self.client.get(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
