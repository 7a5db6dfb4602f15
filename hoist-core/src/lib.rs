//! Hoist Core
//!
//! Core types and abstractions for the Hoist deployment pipeline.
//!
//! This crate contains:
//! - Domain types: artifacts, credentials, deploy targets and the run state machine
//! - Errors: the failure taxonomy every pipeline run terminates with
//! - DTOs: data transfer objects for orchestrator/client communication

pub mod domain;
pub mod dto;
pub mod error;
