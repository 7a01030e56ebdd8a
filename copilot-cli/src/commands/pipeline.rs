//! Pipeline command handlers
//!
//! Handles all pipeline-related CLI commands including creation,
//! validation, retirement, listing and inspection.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use copilot_client::OrchestratorClient;
use copilot_core::domain::pipeline::{PipelineRecord, PipelineStatus};
use copilot_core::dto::pipeline::PipelineFilter;

use super::print_violations;
use crate::config::Config;
use crate::id_resolver::resolve_pipeline_id;
use crate::types::IdOrPrefix;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Create a draft pipeline from a natural-language request
    Create {
        /// What the pipeline should do, e.g. "load data/sales.csv into the sales table"
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,
    },
    /// Validate a draft and activate it
    Validate {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Retire an active pipeline
    Retire {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// List pipelines
    List {
        /// Only pipelines in this status
        #[arg(short, long)]
        status: Option<PipelineStatus>,

        /// Substring of the name or description
        #[arg(short, long)]
        query: Option<String>,

        /// Maximum number of pipelines to show
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Get pipeline details
    Get {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Show the scheduler catalog
    Catalog,
    /// Check that the stored artifact matches the pipeline code
    Check {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
}

/// Handle pipeline commands
///
/// Routes pipeline subcommands to their respective handlers.
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        PipelineCommands::Create { request } => create_pipeline(&client, &request.join(" ")).await,
        PipelineCommands::Validate { id } => validate_pipeline(&client, &id).await,
        PipelineCommands::Retire { id } => retire_pipeline(&client, &id).await,
        PipelineCommands::List {
            status,
            query,
            limit,
        } => {
            let filter = PipelineFilter {
                status,
                q: query,
                limit,
            };
            list_pipelines(&client, &filter).await
        }
        PipelineCommands::Get { id } => get_pipeline(&client, &id).await,
        PipelineCommands::Catalog => show_catalog(&client).await,
        PipelineCommands::Check { id } => check_pipeline(&client, &id).await,
    }
}

/// Create a draft pipeline
async fn create_pipeline(client: &OrchestratorClient, request: &str) -> Result<()> {
    let pipeline = client.create_pipeline(request).await?;

    println!("{}", "✓ Pipeline drafted".green().bold());
    println!("  ID:     {}", pipeline.id.to_string().cyan());
    println!("  Name:   {}", pipeline.name.bold());
    println!("  Status: {}", colorize_status(pipeline.status));
    println!();
    println!(
        "  Review it with {} and activate it with {}",
        format!("copilot pipeline get {}", short(&pipeline)).dimmed(),
        format!("copilot pipeline validate {}", short(&pipeline)).dimmed()
    );

    Ok(())
}

/// Validate a pipeline
async fn validate_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;

    match client.validate_pipeline(uuid).await {
        Ok(pipeline) => {
            println!("{}", "✓ Pipeline is active".green().bold());
            println!("  ID:       {}", pipeline.id.to_string().cyan());
            if let Some(artifact) = &pipeline.artifact_ref {
                println!("  Artifact: {}", artifact.dimmed());
            }
            Ok(())
        }
        Err(err) => {
            println!("{}", "✗ Validation failed".red().bold());
            print_violations(&err);
            Err(err.into())
        }
    }
}

/// Retire a pipeline
async fn retire_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;

    client.retire_pipeline(uuid).await?;

    println!("{}", format!("✓ Pipeline {} retired", uuid).green().bold());

    Ok(())
}

/// List pipelines
async fn list_pipelines(client: &OrchestratorClient, filter: &PipelineFilter) -> Result<()> {
    let pipelines = client.list_pipelines(filter).await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} pipeline(s):", pipelines.len()).bold()
        );
        println!();
        for pipeline in pipelines {
            print_pipeline_summary(&pipeline);
        }
    }

    Ok(())
}

/// Get and display a single pipeline
async fn get_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;

    let pipeline = client.get_pipeline(uuid).await?;

    print_pipeline_details(&pipeline);

    Ok(())
}

/// Show active scheduled pipelines
async fn show_catalog(client: &OrchestratorClient) -> Result<()> {
    let entries = client.pipeline_catalog().await?;

    if entries.is_empty() {
        println!("{}", "No scheduled pipelines.".yellow());
        return Ok(());
    }

    for entry in entries {
        println!(
            "  {} {:<12} {} {}",
            "▸".cyan(),
            entry.schedule.yellow(),
            entry.name.bold(),
            entry.id.to_string().dimmed()
        );
    }

    Ok(())
}

/// Check artifact consistency
async fn check_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)).await?;

    client.check_consistency(uuid).await?;

    println!("{}", format!("✓ Pipeline {} is consistent", uuid).green().bold());

    Ok(())
}

fn short(pipeline: &PipelineRecord) -> String {
    pipeline.id.to_string()[..8].to_string()
}

/// Print a pipeline summary
fn print_pipeline_summary(pipeline: &PipelineRecord) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        pipeline.name.bold(),
        colorize_status(pipeline.status)
    );
    println!("    ID:      {}", pipeline.id.to_string().dimmed());
    println!(
        "    Created: {}",
        pipeline
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if !pipeline.description.is_empty() {
        println!("    Description: {}", pipeline.description.dimmed());
    }
    println!();
}

/// Print detailed pipeline information
fn print_pipeline_details(pipeline: &PipelineRecord) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:          {}", pipeline.id.to_string().cyan());
    println!("  Name:        {}", pipeline.name.bold());
    println!("  Status:      {}", colorize_status(pipeline.status));
    if !pipeline.description.is_empty() {
        println!("  Description: {}", pipeline.description);
    }
    println!("  Request:     {}", pipeline.request_text);
    println!(
        "  Created:     {}",
        pipeline.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:     {}",
        pipeline.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(artifact) = &pipeline.artifact_ref {
        println!("  Artifact:    {}", artifact);
    }

    if !pipeline.violations.is_empty() {
        println!("\n{}", "Violations:".bold());
        for violation in &pipeline.violations {
            println!("  {}", violation.to_string().red());
        }
    }

    println!("\n{}", "Spec:".bold());
    match serde_json::to_string_pretty(&pipeline.spec) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{:?}", pipeline.spec),
    }

    println!("\n{}", "Code:".bold());
    println!("{}", "─".repeat(80).dimmed());
    println!("{}", pipeline.code);
    println!("{}", "─".repeat(80).dimmed());
}

/// Colorize pipeline status for display
fn colorize_status(status: PipelineStatus) -> ColoredString {
    let status_str = status.as_str();
    match status {
        PipelineStatus::Draft => status_str.yellow(),
        PipelineStatus::Validating => status_str.cyan(),
        PipelineStatus::Active => status_str.green(),
        PipelineStatus::ValidationFailed => status_str.red(),
        PipelineStatus::Retired => status_str.dimmed(),
    }
}
