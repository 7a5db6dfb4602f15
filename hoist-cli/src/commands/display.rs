//! Terminal rendering of runs and logs

use colored::*;
use hoist_core::domain::log::{LogEntry, LogLevel};
use hoist_core::domain::run::{PipelineRun, RunState, StepStatus};
use hoist_core::dto::run::RunSummary;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Print a run summary line block
pub fn print_run_summary(run: &RunSummary) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Commit:   {} ({})", short_commit(&run.commit), run.branch);
    match run.failure_kind {
        Some(kind) => println!("    State:    {} {}", colorize_state(run.state), kind.to_string().red()),
        None => println!("    State:    {}", colorize_state(run.state)),
    }
    println!(
        "    Created:  {}",
        run.created_at.format(TIME_FORMAT).to_string().dimmed()
    );
    println!();
}

/// Print detailed run information
pub fn print_run_details(run: &PipelineRun) {
    println!("{}", "Run Details:".bold());
    println!("  ID:        {}", run.id.to_string().cyan());
    println!("  Commit:    {}", run.trigger.commit);
    println!("  Branch:    {}", run.trigger.branch);
    println!("  State:     {}", colorize_state(run.state));
    println!("  Created:   {}", run.created_at.format(TIME_FORMAT));

    if let Some(finished) = run.finished_at {
        println!("  Finished:  {}", finished.format(TIME_FORMAT));
        let seconds = finished.signed_duration_since(run.created_at).num_seconds();
        println!("  Duration:  {}s", seconds);
    }

    if let Some(image) = &run.image {
        println!("  Image:     {}", image);
    }

    if !run.steps.is_empty() {
        println!("\n{}", "Steps:".bold());
        for step in &run.steps {
            let status = match step.status {
                StepStatus::Succeeded => "✓".green(),
                StepStatus::Failed => "✗".red(),
                StepStatus::Skipped => "-".dimmed(),
            };
            let took = match (step.started_at, step.finished_at) {
                (Some(start), Some(end)) => {
                    format!("{}s", end.signed_duration_since(start).num_seconds())
                }
                _ => String::new(),
            };
            println!("  {} {:<8} {}", status, step.name.to_string(), took.dimmed());
        }
    }

    if let Some(failure) = &run.failure {
        println!("\n{}", "Failure:".bold());
        println!("  Kind:      {}", failure.kind.to_string().red());
        if let Some(step) = failure.step {
            println!("  Step:      {}", step);
        }
        println!("  {}", failure.message.red());
    }
}

/// Print a log entry
pub fn print_log_entry(log: &LogEntry) {
    let level_str = log.level.to_string();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

/// Colorize run state for display
pub fn colorize_state(state: RunState) -> ColoredString {
    let state_str = state.to_string();
    match state {
        RunState::Triggered => state_str.yellow(),
        RunState::Succeeded => state_str.green(),
        RunState::Failed => state_str.red(),
        _ => state_str.cyan(),
    }
}

fn short_commit(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}
