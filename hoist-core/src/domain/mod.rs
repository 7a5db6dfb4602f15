//! Core domain types
//!
//! This module contains the core domain structures used across Hoist crates.
//! They are shared between the runner (which executes pipelines) and the
//! orchestrator (which triggers runs and serves their state).

pub mod artifact;
pub mod credential;
pub mod log;
pub mod run;
pub mod target;
