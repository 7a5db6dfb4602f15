//! Service layer
//!
//! Services implement the pipeline stages. Each stage is trait-based so the
//! executor can be exercised with fakes:
//! - Project tasks: dependency installation and the test gate
//! - Artifact builder: container image from a source snapshot
//! - Registry publisher: authenticated push of both tags
//! - Remote deployer: replace the running instance on the target

mod builder;
mod deployer;
mod publisher;
mod tasks;

// Re-export traits
pub use builder::ArtifactBuilder;
pub use deployer::{DeployReport, RemoteDeployer};
pub use publisher::RegistryPublisher;
pub use tasks::ProjectTasks;

// Re-export implementations
pub use builder::DockerBuilder;
pub use deployer::ContainerDeployer;
pub use publisher::DockerPublisher;
pub use tasks::CommandTasks;
