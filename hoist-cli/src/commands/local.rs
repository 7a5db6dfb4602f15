//! Local pipeline run
//!
//! Runs install, test, build, publish and deploy from this machine against
//! the source directory as it is. Configuration and secrets come from the
//! same environment variables the orchestrator reads. Ctrl-C cancels the run
//! before its next step.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use colored::*;
use hoist_core::domain::artifact::SourceSnapshot;
use hoist_core::domain::run::{PipelineRun, Trigger};
use hoist_runner::checkout::resolve_head;
use hoist_runner::process::LocalExecutor;
use hoist_runner::{PipelineExecutor, PipelineSecrets, RunContext, RunObserver, RunOutcome, RunnerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::display::{colorize_state, print_log_entry, print_run_details};

#[derive(Args)]
pub struct RunArgs {
    /// Application source directory (default: HOIST_SOURCE_DIR or .)
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Commit to label the run with (default: HEAD of the source directory)
    #[arg(long)]
    pub sha: Option<String>,
}

/// Prints each state change as it happens
struct ProgressObserver;

#[async_trait]
impl RunObserver for ProgressObserver {
    async fn on_update(&self, run: &PipelineRun) {
        println!("{} {}", "▸".cyan(), colorize_state(run.state).bold());
    }
}

pub async fn run_pipeline(args: RunArgs) -> Result<()> {
    let mut config = RunnerConfig::from_env().context("Failed to load runner configuration")?;
    if let Some(source) = args.source {
        config.source_dir = source;
    }
    config.validate()?;
    let secrets = PipelineSecrets::from_env().context("Failed to load pipeline secrets")?;

    let executor = LocalExecutor::new();
    let commit = match args.sha {
        Some(sha) => sha,
        None => resolve_head(&executor, &config.source_dir)
            .await
            .context("No --sha given and the source directory has no readable HEAD")?,
    };

    let mut run = PipelineRun::new(Trigger::push(commit.clone(), config.branch.clone()));
    let ctx = RunContext::new(run.id);
    println!(
        "{}",
        format!("Run {} for {} on {}", run.id, commit, config.branch).bold()
    );

    let cancel_on_interrupt = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "Cancelling before the next step...".yellow());
                ctx.cancel();
            }
        })
    };
    let printer = spawn_log_printer(ctx.clone());

    let snapshot = SourceSnapshot::new(&config.source_dir, commit);
    let outcome = PipelineExecutor::from_config(&config)
        .execute(&mut run, &snapshot, &secrets, &ctx, &ProgressObserver)
        .await;

    printer.abort();
    cancel_on_interrupt.abort();
    for entry in ctx.drain_logs() {
        print_log_entry(&entry);
    }

    match outcome? {
        RunOutcome::Succeeded(report) => {
            println!();
            println!("{}", "✓ Deployed".green().bold());
            println!("  Image:     {}", run.image.as_deref().unwrap_or("-"));
            println!("  Container: {}", report.container_id);
            if !report.stopped_previous {
                println!("  {}", "No previous instance was running".dimmed());
            }
            Ok(())
        }
        RunOutcome::Failed(err) => {
            println!();
            print_run_details(&run);
            Err(anyhow::anyhow!(err).context("Pipeline failed"))
        }
    }
}

/// Prints buffered run logs while the pipeline executes
fn spawn_log_printer(ctx: Arc<RunContext>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(250));
        loop {
            interval.tick().await;
            for entry in ctx.drain_logs() {
                print_log_entry(&entry);
            }
        }
    })
}
