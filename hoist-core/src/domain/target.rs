//! Deploy target domain types

use crate::domain::credential::Secret;

/// Remote host the artifact is deployed to
///
/// Used exclusively by the remote deployer to open one session per deployment.
#[derive(Debug, Clone)]
pub struct DeployTarget {
    /// Host name or address
    pub host: Secret,

    /// Login identity on the host
    pub user: Secret,

    /// Private key material (PEM/OpenSSH format)
    pub private_key: Secret,

    /// SSH port
    pub port: u16,
}

impl DeployTarget {
    pub fn new(
        host: impl Into<Secret>,
        user: impl Into<Secret>,
        private_key: impl Into<Secret>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            private_key: private_key.into(),
            port: 22,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// The named container instance kept running on the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    /// Container name reused across deployments
    pub name: String,

    /// Port published on the host
    pub host_port: u16,

    /// Port the application listens on inside the container
    pub container_port: u16,
}

impl InstanceSpec {
    /// Publishes `port` on the host under the same number
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host_port: port,
            container_port: port,
        }
    }

    /// `-p` argument value for the container engine
    pub fn port_mapping(&self) -> String {
        format!("{}:{}", self.host_port, self.container_port)
    }
}
