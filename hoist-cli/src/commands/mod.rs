//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod display;
mod local;
mod remote;

pub use local::RunArgs;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the whole pipeline on this machine
    Run(RunArgs),
    /// Send a push event to the orchestrator
    Trigger {
        /// Commit that was pushed
        #[arg(long)]
        sha: String,

        /// Branch the commit was pushed to
        #[arg(long, default_value = "main")]
        branch: String,

        /// Shared webhook secret
        #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
        token: Option<String>,
    },
    /// List runs, newest first
    List,
    /// Show a run
    Get {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Show the logs of a run
    Logs {
        /// Run ID or unambiguous prefix
        id: String,

        /// Keep printing until the run finishes
        #[arg(short, long)]
        follow: bool,
    },
    /// Cancel a run before its next step
    Cancel {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Check that the orchestrator is up
    Health,
}

/// Handle a CLI command
///
/// `run` executes locally; everything else talks to the orchestrator.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run(args) => local::run_pipeline(args).await,
        Commands::Trigger { sha, branch, token } => {
            remote::trigger(config, sha, branch, token).await
        }
        Commands::List => remote::list_runs(config).await,
        Commands::Get { id } => remote::get_run(config, &id).await,
        Commands::Logs { id, follow } => remote::get_run_logs(config, &id, follow).await,
        Commands::Cancel { id } => remote::cancel_run(config, &id).await,
        Commands::Health => remote::health(config).await,
    }
}
