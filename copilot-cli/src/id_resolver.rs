//! ID resolver module
//!
//! Handles resolution of UUID prefixes to full UUIDs by querying the API.
//! This allows users to specify short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use copilot_client::OrchestratorClient;
use copilot_core::domain::execution::ExecutionStatus;
use copilot_core::dto::pipeline::PipelineFilter;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a pipeline ID or prefix to a full UUID
///
/// If the input is already a full UUID, returns it immediately.
/// Otherwise, fetches all pipelines and finds the one matching the prefix.
pub async fn resolve_pipeline_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let pipelines = client
        .list_pipelines(&PipelineFilter::default())
        .await
        .context("Failed to fetch pipelines for ID resolution")?;

    pick("pipeline", pipelines.iter().map(|p| p.id), id_or_prefix)
}

/// Resolve an execution ID or prefix to a full UUID
///
/// Executions are only listed per status, so every status is scanned.
pub async fn resolve_execution_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let mut ids = Vec::new();
    for status in [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Succeeded,
        ExecutionStatus::Failed,
    ] {
        let executions = client
            .list_executions_by_status(status)
            .await
            .context("Failed to fetch executions for ID resolution")?;
        ids.extend(executions.iter().map(|e| e.id));
    }

    pick("execution", ids.into_iter(), id_or_prefix)
}

/// Select the single id matching a prefix
fn pick(kind: &str, ids: impl Iterator<Item = Uuid>, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids.filter(|id| id_or_prefix.matches(*id)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No {} found with ID starting with '{}'",
            kind,
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|id| id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple {}s: {}",
                id_or_prefix,
                kind,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<Uuid> {
        [
            "ab12cd34-0000-4000-8000-000000000001",
            "ab12ef56-0000-4000-8000-000000000002",
            "ff000000-0000-4000-8000-000000000003",
        ]
        .iter()
        .map(|s| Uuid::parse_str(s).unwrap())
        .collect()
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let id = pick("pipeline", ids().into_iter(), &IdOrPrefix::parse("ff")).unwrap();
        assert_eq!(id, ids()[2]);
    }

    #[test]
    fn test_ambiguous_prefix_lists_candidates() {
        let err = pick("pipeline", ids().into_iter(), &IdOrPrefix::parse("ab12"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Ambiguous"));
        assert!(err.contains("ab12cd34"));
        assert!(err.contains("ab12ef56"));
    }

    #[test]
    fn test_unknown_prefix() {
        let err = pick("execution", ids().into_iter(), &IdOrPrefix::parse("00"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("No execution found"));
    }
}
