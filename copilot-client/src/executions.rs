//! Execution-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use copilot_core::domain::execution::{ExecutionRecord, ExecutionStatus};
use copilot_core::dto::execution::{
    ExecutionFilter, StatusReport, TriggerExecution, TriggerResponse,
};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Execution Lifecycle
    // =============================================================================

    /// Trigger a run of an active pipeline
    ///
    /// # Returns
    /// The id of the new pending execution
    ///
    /// # Example
    /// ```no_run
    /// # use copilot_client::OrchestratorClient;
    /// # use uuid::Uuid;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let execution_id = client
    ///     .trigger_execution(Uuid::new_v4(), serde_json::json!({ "date": "2024-01-01" }))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn trigger_execution(
        &self,
        pipeline_id: Uuid,
        input: serde_json::Value,
    ) -> Result<Uuid> {
        let url = self.url(&format!("/pipeline/{}/trigger", pipeline_id));
        let req = TriggerExecution { input };
        let response = self.client.post(&url).json(&req).send().await?;

        let accepted: TriggerResponse = self.handle_response(response).await?;
        Ok(accepted.execution_id)
    }

    /// Report a status change for an execution
    ///
    /// Only forward transitions are accepted; anything else is a 409.
    pub async fn report_status(
        &self,
        execution_id: Uuid,
        report: &StatusReport,
    ) -> Result<ExecutionRecord> {
        let url = self.url(&format!("/execution/{}/status", execution_id));
        let response = self.client.post(&url).json(report).send().await?;

        self.handle_response(response).await
    }

    /// Get an execution by ID
    pub async fn get_execution(&self, execution_id: Uuid) -> Result<ExecutionRecord> {
        let url = self.url(&format!("/execution/{}", execution_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List a pipeline's executions, newest first
    pub async fn list_executions_by_pipeline(
        &self,
        pipeline_id: Uuid,
    ) -> Result<Vec<ExecutionRecord>> {
        let url = self.url(&format!("/execution/pipeline/{}", pipeline_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List executions in one status, oldest first
    pub async fn list_executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<ExecutionRecord>> {
        let filter = ExecutionFilter {
            status: Some(status),
        };
        let response = self
            .client
            .get(self.url("/execution/list"))
            .query(&filter)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
