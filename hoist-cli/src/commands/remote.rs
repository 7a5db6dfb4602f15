//! Orchestrator command handlers
//!
//! Trigger, list, inspect and cancel runs on a running orchestrator.

use anyhow::{Context, Result};
use colored::*;
use hoist_core::dto::run::PushEvent;
use std::time::Duration;

use super::display::{colorize_state, print_log_entry, print_run_details, print_run_summary};
use crate::config::Config;
use crate::id_resolver::resolve_run_id;
use crate::types::IdOrPrefix;

/// Delay between polls when following logs
const FOLLOW_INTERVAL: Duration = Duration::from_secs(2);

/// Send a push event for `sha` on `branch`
pub async fn trigger(config: &Config, sha: String, branch: String, token: Option<String>) -> Result<()> {
    let client = config.client();
    let event = PushEvent {
        git_ref: format!("refs/heads/{}", branch),
        after: sha,
    };

    let ack = client
        .trigger_push(&event, token.as_deref())
        .await
        .context("Failed to send push event")?;

    match ack.run_id {
        Some(run_id) if !ack.ignored => {
            println!("{}", "✓ Run started".green().bold());
            println!("  ID: {}", run_id.to_string().cyan());
            println!();
            println!(
                "{}",
                format!("Follow it with: hoist logs {} --follow", run_id).dimmed()
            );
        }
        _ => {
            println!(
                "{} {}",
                "Push ignored:".yellow(),
                ack.reason.as_deref().unwrap_or("no reason given")
            );
        }
    }

    Ok(())
}

/// List all runs
pub async fn list_runs(config: &Config) -> Result<()> {
    let runs = config.client().list_runs().await?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in &runs {
            print_run_summary(run);
        }
    }

    Ok(())
}

/// Show one run
pub async fn get_run(config: &Config, id: &str) -> Result<()> {
    let client = config.client();
    let run_id = resolve_run_id(&client, &IdOrPrefix::parse(id)).await?;

    let run = client.get_run(run_id).await?;
    print_run_details(&run);

    Ok(())
}

/// Print the logs of a run, optionally until it finishes
pub async fn get_run_logs(config: &Config, id: &str, follow: bool) -> Result<()> {
    let client = config.client();
    let run_id = resolve_run_id(&client, &IdOrPrefix::parse(id)).await?;

    let mut printed = 0;
    loop {
        // Fetch the state first so logs flushed on completion are not missed
        let finished = !follow || client.get_run(run_id).await?.is_terminal();
        let logs = client.get_run_logs(run_id).await?;

        if printed == 0 && logs.is_empty() && finished {
            println!("{}", "No logs found for this run.".yellow());
            return Ok(());
        }

        for entry in logs.iter().skip(printed) {
            print_log_entry(entry);
        }
        printed = printed.max(logs.len());

        if finished {
            break;
        }
        tokio::time::sleep(FOLLOW_INTERVAL).await;
    }

    if follow {
        let run = client.get_run(run_id).await?;
        println!();
        println!("Run finished: {}", colorize_state(run.state));
    }

    Ok(())
}

/// Cancel a run
pub async fn cancel_run(config: &Config, id: &str) -> Result<()> {
    let client = config.client();
    let run_id = resolve_run_id(&client, &IdOrPrefix::parse(id)).await?;

    match client.cancel_run(run_id).await {
        Ok(run) => {
            println!("{}", "✓ Cancellation requested".green().bold());
            println!("  ID:    {}", run.id.to_string().cyan());
            println!("  State: {}", colorize_state(run.state));
            println!(
                "{}",
                "The run stops before its next step; the current step finishes first.".dimmed()
            );
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            println!("{}", "Run already finished, nothing to cancel.".yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Check orchestrator health
pub async fn health(config: &Config) -> Result<()> {
    config
        .client()
        .health()
        .await
        .with_context(|| format!("Orchestrator at {} is not healthy", config.orchestrator_url))?;

    println!("{} {}", "✓".green(), config.orchestrator_url);
    Ok(())
}
