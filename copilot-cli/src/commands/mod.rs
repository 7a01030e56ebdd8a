//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod execution;
mod pipeline;

pub use execution::ExecutionCommands;
pub use pipeline::PipelineCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use copilot_client::{ClientError, OrchestratorClient};

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline management
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Execution management
    Execution {
        #[command(subcommand)]
        command: ExecutionCommands,
    },
    /// Check orchestrator and store health
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Execution { command } => {
            execution::handle_execution_command(command, config).await
        }
        Commands::Health => health(config).await,
    }
}

async fn health(config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    let report = client.health().await?;

    let show = |name: &str, ok: bool, error: &Option<String>| {
        let mark = if ok { "✓".green() } else { "✗".red() };
        match error {
            Some(error) => println!("  {} {:<15} {}", mark, name, error.dimmed()),
            None => println!("  {} {}", mark, name),
        }
    };

    println!("{}", "Orchestrator Health:".bold());
    show(
        "metadata store",
        report.metadata_store.ok,
        &report.metadata_store.error,
    );
    show(
        "artifact store",
        report.artifact_store.ok,
        &report.artifact_store.error,
    );

    if !report.is_healthy() {
        anyhow::bail!("orchestrator is unhealthy");
    }

    Ok(())
}

/// Print validator findings carried by an API error
fn print_violations(err: &ClientError) {
    if err.violations().is_empty() {
        return;
    }

    println!("{}", "Violations:".bold());
    for violation in err.violations() {
        println!("  {} {}", format!("[{}]", violation.rule).red(), violation.message);
        if let Some(fragment) = &violation.fragment {
            println!("      {}", fragment.dimmed());
        }
    }
}
