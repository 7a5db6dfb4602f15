//! hoist runner
//!
//! Everything needed to take one commit from source to a running container:
//! - Process and remote-session plumbing (`process`, `remote`)
//! - Per-run context with buffered logs and cancellation
//! - The step services: install/test, build, publish, deploy
//! - The pipeline executor driving the run state machine

pub mod checkout;
pub mod config;
pub mod context;
pub mod dockerfile;
pub mod executor;
pub mod probe;
pub mod process;
pub mod remote;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::{PipelineSecrets, RunnerConfig, StepTimeouts};
pub use context::RunContext;
pub use executor::{NoopObserver, PipelineExecutor, RunObserver, RunOutcome, Stages};
