use anyhow::{Context, Result};
use hoist_core::domain::credential::Secret;
use hoist_runner::checkout::GitCheckout;
use hoist_runner::process::{CommandExecutor, LocalExecutor, check_tool_available};
use hoist_runner::{PipelineExecutor, PipelineSecrets, RunnerConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod repository;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

use crate::api::AppState;
use crate::service::{RunLauncher, SharedDirectory, SourceMode};
use crate::store::RunStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hoist_orchestrator=debug,hoist_runner=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Hoist Orchestrator...");

    let config = RunnerConfig::from_env().context("Failed to load runner configuration")?;
    config.validate()?;
    let secrets = PipelineSecrets::from_env().context("Failed to load pipeline secrets")?;

    tracing::info!(
        "Deploying pushes to '{}' as {} (container {}, port {})",
        config.branch,
        config.image,
        config.container_name,
        config.port
    );

    // Missing tools only fail the runs that need them
    let executor: Arc<dyn CommandExecutor> = Arc::new(LocalExecutor::new());
    for tool in [config.engine.as_str(), "ssh", "git"] {
        if let Err(e) = check_tool_available(executor.as_ref(), tool).await {
            tracing::warn!("{:#}", e);
        }
    }

    let source = match std::env::var("HOIST_CHECKOUT").as_deref() {
        Ok("directory") => SourceMode::Directory(SharedDirectory::new(
            executor.clone(),
            config.source_dir.clone(),
        )),
        _ => SourceMode::Worktree(GitCheckout::new(executor, config.source_dir.clone())),
    };

    let launcher = RunLauncher::new(
        PipelineExecutor::from_config(&config),
        source,
        secrets,
        config.log_send_interval,
    );

    let webhook_secret = std::env::var("WEBHOOK_SECRET")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| Arc::new(Secret::new(s)));
    if webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set, accepting unauthenticated pushes");
    }

    let max_runs = match std::env::var("ORCHESTRATOR_MAX_RUNS") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("ORCHESTRATOR_MAX_RUNS is not a number: {}", value))?,
        Err(_) => store::DEFAULT_MAX_RUNS,
    };
    tracing::info!("Keeping up to {} finished runs", max_runs);

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        store: RunStore::with_retention(max_runs),
        launcher: Arc::new(launcher),
        branch: config.branch.clone(),
        webhook_secret,
    });

    // Get bind address
    let addr =
        std::env::var("ORCHESTRATOR_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
