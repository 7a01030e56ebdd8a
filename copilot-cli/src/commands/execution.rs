//! Execution command handlers
//!
//! Handles triggering runs, status reports from runners, inspection and the
//! timeout reaper.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::*;
use copilot_client::OrchestratorClient;
use copilot_core::domain::execution::{ExecutionRecord, ExecutionStatus};
use copilot_core::dto::execution::StatusReport;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::config::Config;
use crate::id_resolver::{resolve_execution_id, resolve_pipeline_id};
use crate::types::IdOrPrefix;

/// Error message recorded on executions failed by the reaper
const TIMEOUT_ERROR: &str = "timeout";

/// Execution subcommands
#[derive(Subcommand)]
pub enum ExecutionCommands {
    /// Trigger a run of an active pipeline
    Trigger {
        /// Pipeline ID or unambiguous prefix
        pipeline: String,

        /// Run input as a JSON object
        #[arg(short, long, value_parser = parse_json)]
        input: Option<JsonValue>,
    },
    /// Get execution details
    Get {
        /// Execution ID or unambiguous prefix
        id: String,
    },
    /// List executions of a pipeline
    List {
        /// Pipeline ID or unambiguous prefix
        pipeline: String,
    },
    /// Report a status change (used by runners)
    Report {
        /// Execution ID or unambiguous prefix
        id: String,

        /// New status: running, succeeded or failed
        status: ExecutionStatus,

        /// Error message for a failed run
        #[arg(short, long)]
        error: Option<String>,

        /// Run output as JSON
        #[arg(short, long, value_parser = parse_json)]
        output: Option<JsonValue>,
    },
    /// Fail every execution that has been pending or running for too long
    Reap {
        /// Seconds an execution may stay pending or running
        #[arg(long)]
        timeout_secs: u64,
    },
}

/// Parse a JSON command-line value
fn parse_json(s: &str) -> Result<JsonValue> {
    serde_json::from_str(s).with_context(|| format!("invalid JSON: {}", s))
}

/// Handle execution commands
///
/// Routes execution subcommands to their respective handlers.
pub async fn handle_execution_command(command: ExecutionCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        ExecutionCommands::Trigger { pipeline, input } => {
            trigger_execution(&client, &pipeline, input).await
        }
        ExecutionCommands::Get { id } => get_execution(&client, &id).await,
        ExecutionCommands::List { pipeline } => list_executions(&client, &pipeline).await,
        ExecutionCommands::Report {
            id,
            status,
            error,
            output,
        } => {
            let report = StatusReport {
                status,
                error_message: error,
                output,
            };
            report_status(&client, &id, report).await
        }
        ExecutionCommands::Reap { timeout_secs } => reap(&client, timeout_secs).await,
    }
}

/// Trigger a pipeline run
async fn trigger_execution(
    client: &OrchestratorClient,
    pipeline: &str,
    input: Option<JsonValue>,
) -> Result<()> {
    let pipeline_id = resolve_pipeline_id(client, &IdOrPrefix::parse(pipeline)).await?;

    let execution_id = client
        .trigger_execution(pipeline_id, input.unwrap_or(JsonValue::Null))
        .await?;

    println!("{}", "✓ Execution queued".green().bold());
    println!("  Execution ID: {}", execution_id.to_string().cyan());
    println!("  Pipeline ID:  {}", pipeline_id.to_string().dimmed());

    Ok(())
}

/// Get and display a single execution
async fn get_execution(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_execution_id(client, &IdOrPrefix::parse(id)).await?;

    let execution = client.get_execution(uuid).await?;

    print_execution_details(&execution);

    Ok(())
}

/// List executions of a pipeline
async fn list_executions(client: &OrchestratorClient, pipeline: &str) -> Result<()> {
    let pipeline_id = resolve_pipeline_id(client, &IdOrPrefix::parse(pipeline)).await?;

    let executions = client.list_executions_by_pipeline(pipeline_id).await?;

    if executions.is_empty() {
        println!("{}", "No executions found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} execution(s):", executions.len()).bold()
        );
        println!();
        for execution in executions {
            print_execution_summary(&execution);
        }
    }

    Ok(())
}

/// Report a status change
async fn report_status(client: &OrchestratorClient, id: &str, report: StatusReport) -> Result<()> {
    let uuid = resolve_execution_id(client, &IdOrPrefix::parse(id)).await?;

    let execution = client.report_status(uuid, &report).await?;

    println!(
        "{} {} is now {}",
        "✓".green(),
        execution.id.to_string().cyan(),
        colorize_status(execution.status)
    );

    Ok(())
}

/// Fail every overdue pending or running execution
async fn reap(client: &OrchestratorClient, timeout_secs: u64) -> Result<()> {
    let deadline = i64::try_from(timeout_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut candidates = client
        .list_executions_by_status(ExecutionStatus::Running)
        .await?;
    candidates.extend(
        client
            .list_executions_by_status(ExecutionStatus::Pending)
            .await?,
    );

    let overdue = overdue(&candidates, deadline);
    if overdue.is_empty() {
        println!("{}", "No overdue executions.".green());
        return Ok(());
    }

    let mut reaped = 0;
    for id in overdue {
        match client
            .report_status(id, &StatusReport::failed(TIMEOUT_ERROR))
            .await
        {
            Ok(_) => {
                reaped += 1;
                println!("  {} {}", "✗".red(), id.to_string().cyan());
            }
            // Finished between the listing and the report
            Err(err) if err.is_client_error() => {
                println!("  {} {} {}", "-".dimmed(), id.to_string().dimmed(), err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    println!(
        "{}",
        format!("Failed {} overdue execution(s)", reaped).bold()
    );

    Ok(())
}

/// Executions that have been waiting or running since before `deadline`
fn overdue(executions: &[ExecutionRecord], deadline: DateTime<Utc>) -> Vec<Uuid> {
    executions
        .iter()
        .filter(|execution| {
            let since = match execution.status {
                ExecutionStatus::Running => execution.started_at.unwrap_or(execution.requested_at),
                ExecutionStatus::Pending => execution.requested_at,
                ExecutionStatus::Succeeded | ExecutionStatus::Failed => return false,
            };
            since < deadline
        })
        .map(|execution| execution.id)
        .collect()
}

/// Print an execution summary
fn print_execution_summary(execution: &ExecutionRecord) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        execution.id.to_string().bold(),
        colorize_status(execution.status)
    );
    println!(
        "    Requested: {}",
        execution
            .requested_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(error) = &execution.error_message {
        println!("    Error:     {}", error.red());
    }
    println!();
}

/// Print detailed execution information
fn print_execution_details(execution: &ExecutionRecord) {
    println!("{}", "Execution Details:".bold());
    println!("  ID:          {}", execution.id.to_string().cyan());
    println!(
        "  Pipeline ID: {}",
        execution.pipeline_id.to_string().dimmed()
    );
    println!("  Status:      {}", colorize_status(execution.status));
    println!(
        "  Requested:   {}",
        execution.requested_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = execution.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = execution.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = execution.started_at {
            let duration = completed.signed_duration_since(started);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    println!("\n{}", "Input:".bold());
    match serde_json::to_string_pretty(&execution.input) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{:?}", execution.input),
    }

    if let Some(output) = &execution.output {
        println!("\n{}", "Output:".bold());
        match serde_json::to_string_pretty(output) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{:?}", output),
        }
    }

    if let Some(error) = &execution.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

/// Colorize execution status for display
fn colorize_status(status: ExecutionStatus) -> ColoredString {
    let status_str = status.as_str();
    match status {
        ExecutionStatus::Pending => status_str.yellow(),
        ExecutionStatus::Running => status_str.cyan(),
        ExecutionStatus::Succeeded => status_str.green(),
        ExecutionStatus::Failed => status_str.red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn execution(
        status: ExecutionStatus,
        requested_ago: i64,
        started_ago: Option<i64>,
    ) -> ExecutionRecord {
        let now = Utc::now();
        ExecutionRecord {
            id: Uuid::new_v4(),
            pipeline_id: Uuid::new_v4(),
            status,
            requested_at: now - Duration::seconds(requested_ago),
            started_at: started_ago.map(|s| now - Duration::seconds(s)),
            completed_at: None,
            error_message: None,
            input: serde_json::json!({}),
            output: None,
        }
    }

    #[test]
    fn test_running_uses_started_at() {
        let deadline = Utc::now() - Duration::seconds(60);
        let long_queued_fresh_start = execution(ExecutionStatus::Running, 600, Some(10));
        let stuck = execution(ExecutionStatus::Running, 600, Some(300));

        let ids = overdue(&[long_queued_fresh_start, stuck.clone()], deadline);

        assert_eq!(ids, vec![stuck.id]);
    }

    #[test]
    fn test_pending_uses_requested_at() {
        let deadline = Utc::now() - Duration::seconds(60);
        let old = execution(ExecutionStatus::Pending, 120, None);
        let fresh = execution(ExecutionStatus::Pending, 5, None);

        let ids = overdue(&[old.clone(), fresh], deadline);

        assert_eq!(ids, vec![old.id]);
    }

    #[test]
    fn test_terminal_executions_are_ignored() {
        let deadline = Utc::now();
        let done = execution(ExecutionStatus::Succeeded, 600, Some(600));
        assert!(overdue(&[done], deadline).is_empty());
    }

    #[test]
    fn test_parse_json_rejects_garbage() {
        assert!(parse_json(r#"{"date":"2024-01-01"}"#).is_ok());
        assert!(parse_json("date=2024").is_err());
    }
}
