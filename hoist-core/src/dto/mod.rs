//! Data Transfer Objects for inter-service communication
//!
//! DTOs used between the orchestrator API and its clients (CLI, scripts).

pub mod run;
