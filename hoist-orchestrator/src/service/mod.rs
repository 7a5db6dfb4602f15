//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod launcher;
pub mod log;
pub mod run;

// Re-export for convenience
pub use launcher::{RunLauncher, SharedDirectory, SourceMode};
pub use log as log_service;
pub use run as run_service;
