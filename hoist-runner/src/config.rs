//! Runner configuration
//!
//! Defines all configurable parameters of a pipeline run: what to build,
//! where to push it, which instance to replace on the target, and how long
//! each step may take. Secrets are loaded separately into
//! [`PipelineSecrets`] and passed explicitly into every run.

use anyhow::{Context, Result};
use hoist_core::domain::credential::{RegistryCredential, Secret};
use hoist_core::domain::run::StepName;
use hoist_core::domain::target::{DeployTarget, InstanceSpec};
use std::path::PathBuf;
use std::time::Duration;

/// Port the application listens on and is published under
pub const DEFAULT_PORT: u16 = 3033;

/// Body the deployed service answers with on `/`
pub const DEFAULT_GREETING: &str = "Hello, Dhaval! This is Node.js app v2.0";

/// Per-step time bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTimeouts {
    pub install: Duration,
    pub test: Duration,
    pub build: Duration,
    pub publish: Duration,
    pub deploy: Duration,
}

impl StepTimeouts {
    pub fn for_step(&self, step: StepName) -> Duration {
        match step {
            StepName::Install => self.install,
            StepName::Test => self.test,
            StepName::Build => self.build,
            StepName::Publish => self.publish,
            StepName::Deploy => self.deploy,
        }
    }

    /// Same bound for every step
    pub fn uniform(limit: Duration) -> Self {
        Self {
            install: limit,
            test: limit,
            build: limit,
            publish: limit,
            deploy: limit,
        }
    }
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            install: Duration::from_secs(300),
            test: Duration::from_secs(300),
            build: Duration::from_secs(900),
            publish: Duration::from_secs(600),
            deploy: Duration::from_secs(300),
        }
    }
}

/// Runner configuration
///
/// All timeouts are configurable to allow tuning for different targets
/// (fast local registry vs slow remote host).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory holding the application source
    pub source_dir: PathBuf,

    /// Image repository, e.g. `docker.io/dhaval/node-app`
    pub image: String,

    /// Container name reused on the deploy target
    pub container_name: String,

    /// Port the artifact listens on and the target publishes
    pub port: u16,

    /// Target platform for the image build
    pub platform: String,

    /// Branch whose pushes trigger a run
    pub branch: String,

    /// Container engine binary, locally and on the target
    pub engine: String,

    /// Dependency installation command
    pub install_cmd: String,

    /// Test command gating the build
    pub test_cmd: String,

    pub timeouts: StepTimeouts,

    /// Probe `http://<host>:<port>/` after deploying
    pub verify: bool,

    /// Expected body of the post-deploy probe
    pub expected_body: Option<String>,

    /// How often buffered run logs are flushed to their sink
    pub log_send_interval: Duration,
}

impl RunnerConfig {
    /// Creates a new configuration with defaults
    pub fn new(source_dir: impl Into<PathBuf>, image: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
            image: image.into(),
            container_name: "node-app".to_string(),
            port: DEFAULT_PORT,
            platform: "linux/amd64".to_string(),
            branch: "main".to_string(),
            engine: "docker".to_string(),
            install_cmd: "npm ci".to_string(),
            test_cmd: "npm test".to_string(),
            timeouts: StepTimeouts::default(),
            verify: false,
            expected_body: Some(DEFAULT_GREETING.to_string()),
            log_send_interval: Duration::from_secs(2),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - HOIST_IMAGE (required)
    /// - HOIST_SOURCE_DIR (optional, default: current directory)
    /// - HOIST_CONTAINER_NAME (optional, default: node-app)
    /// - HOIST_PORT (optional, default: 3033)
    /// - HOIST_PLATFORM (optional, default: linux/amd64)
    /// - HOIST_BRANCH (optional, default: main)
    /// - HOIST_ENGINE (optional, default: docker)
    /// - HOIST_INSTALL_CMD / HOIST_TEST_CMD (optional, default: npm ci / npm test)
    /// - HOIST_{INSTALL,TEST,BUILD,PUBLISH,DEPLOY}_TIMEOUT (optional, seconds)
    /// - HOIST_VERIFY (optional, true/false, default: false)
    /// - HOIST_EXPECTED_BODY (optional, default: the greeting)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let image = lookup("HOIST_IMAGE")
            .ok_or_else(|| anyhow::anyhow!("HOIST_IMAGE environment variable not set"))?;
        let source_dir = lookup("HOIST_SOURCE_DIR").unwrap_or_else(|| ".".to_string());

        let mut config = Self::new(source_dir, image);

        if let Some(name) = lookup("HOIST_CONTAINER_NAME") {
            config.container_name = name;
        }
        if let Some(port) = lookup("HOIST_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("HOIST_PORT is not a valid port: {}", port))?;
        }
        if let Some(platform) = lookup("HOIST_PLATFORM") {
            config.platform = platform;
        }
        if let Some(branch) = lookup("HOIST_BRANCH") {
            config.branch = branch;
        }
        if let Some(engine) = lookup("HOIST_ENGINE") {
            config.engine = engine;
        }
        if let Some(cmd) = lookup("HOIST_INSTALL_CMD") {
            config.install_cmd = cmd;
        }
        if let Some(cmd) = lookup("HOIST_TEST_CMD") {
            config.test_cmd = cmd;
        }
        if let Some(verify) = lookup("HOIST_VERIFY") {
            config.verify = matches!(verify.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(body) = lookup("HOIST_EXPECTED_BODY") {
            config.expected_body = if body.is_empty() { None } else { Some(body) };
        }

        let secs = |key: &str| lookup(key).and_then(|s| s.parse::<u64>().ok());
        let timeouts = &mut config.timeouts;
        for (key, slot) in [
            ("HOIST_INSTALL_TIMEOUT", &mut timeouts.install),
            ("HOIST_TEST_TIMEOUT", &mut timeouts.test),
            ("HOIST_BUILD_TIMEOUT", &mut timeouts.build),
            ("HOIST_PUBLISH_TIMEOUT", &mut timeouts.publish),
            ("HOIST_DEPLOY_TIMEOUT", &mut timeouts.deploy),
        ] {
            if let Some(value) = secs(key) {
                *slot = Duration::from_secs(value);
            }
        }

        Ok(config)
    }

    /// The instance kept running on the deploy target
    pub fn instance(&self) -> InstanceSpec {
        InstanceSpec::new(self.container_name.clone(), self.port)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            anyhow::bail!("image cannot be empty");
        }

        if self.image.contains(char::is_whitespace) || self.image.ends_with(':') {
            anyhow::bail!("image must be a repository name without a tag");
        }

        if self.container_name.is_empty()
            || !self
                .container_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
        {
            anyhow::bail!("container_name must be non-empty and use [A-Za-z0-9_.-]");
        }

        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.branch.trim().is_empty() {
            anyhow::bail!("branch cannot be empty");
        }

        if self.install_cmd.trim().is_empty() || self.test_cmd.trim().is_empty() {
            anyhow::bail!("install and test commands cannot be empty");
        }

        for step in StepName::ALL {
            if self.timeouts.for_step(step).is_zero() {
                anyhow::bail!("{} timeout must be greater than 0", step);
            }
        }

        if self.log_send_interval.is_zero() {
            anyhow::bail!("log_send_interval must be greater than 0");
        }

        Ok(())
    }
}

/// Secrets consumed by a run
///
/// Loaded once and passed explicitly into every run; never logged.
#[derive(Debug, Clone)]
pub struct PipelineSecrets {
    pub registry: RegistryCredential,
    pub target: DeployTarget,
}

impl PipelineSecrets {
    /// Loads secrets from environment variables
    ///
    /// Expected environment variables:
    /// - REGISTRY_USERNAME, REGISTRY_TOKEN
    /// - DEPLOY_HOST, DEPLOY_USER
    /// - DEPLOY_KEY (key material) or DEPLOY_KEY_FILE (path to it)
    /// - DEPLOY_PORT (optional, default: 22)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<Secret> {
            let value = lookup(key).map(Secret::new).unwrap_or_else(|| Secret::new(""));
            if value.is_empty() {
                anyhow::bail!("{} environment variable not set", key);
            }
            Ok(value)
        };

        let private_key = match lookup("DEPLOY_KEY").filter(|k| !k.trim().is_empty()) {
            Some(key) => Secret::new(key),
            None => {
                let path = lookup("DEPLOY_KEY_FILE").ok_or_else(|| {
                    anyhow::anyhow!("DEPLOY_KEY or DEPLOY_KEY_FILE environment variable not set")
                })?;
                let key = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read deploy key file: {}", path))?;
                Secret::new(key)
            }
        };

        let mut target = DeployTarget::new(
            required("DEPLOY_HOST")?,
            required("DEPLOY_USER")?,
            private_key,
        );
        if let Some(port) = lookup("DEPLOY_PORT") {
            let port = port
                .parse()
                .with_context(|| format!("DEPLOY_PORT is not a valid port: {}", port))?;
            target = target.with_port(port);
        }

        Ok(Self {
            registry: RegistryCredential::new(
                required("REGISTRY_USERNAME")?,
                required("REGISTRY_TOKEN")?,
            ),
            target,
        })
    }
}
