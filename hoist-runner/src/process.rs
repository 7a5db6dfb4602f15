//! Local process execution
//!
//! Every external tool the pipeline drives (package manager, container
//! engine, ssh) is invoked through a [`CommandExecutor`]:
//! - Building commands with redacted arguments and secret stdin
//! - Running them asynchronously, killing the child if the future is dropped
//! - Capturing stdout, stderr and the exit code
//!
//! Time bounds are applied by the caller around the returned future; a
//! dropped future kills the child process.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hoist_core::domain::credential::Secret;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Placeholder printed in place of redacted arguments
const REDACTED: &str = "***";

/// A command to execute
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,

    /// Written to the child's stdin, which is then closed
    pub stdin: Option<Secret>,

    /// Indices into `args` that must never be displayed
    redacted: Vec<usize>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Parses a whitespace separated command line, e.g. `npm ci`
    ///
    /// Returns `None` for an empty line. No shell quoting is interpreted.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an argument that is shown as `***` in logs
    pub fn secret_arg(mut self, secret: &Secret) -> Self {
        self.redacted.push(self.args.len());
        self.args.push(secret.expose().to_string());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: Secret) -> Self {
        self.stdin = Some(input);
        self
    }

    /// Human readable command line with secret arguments redacted
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        for (idx, arg) in self.args.iter().enumerate() {
            if self.redacted.contains(&idx) {
                parts.push(REDACTED);
            } else {
                parts.push(arg.as_str());
            }
        }
        parts.join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty line of stderr, falling back to stdout
    ///
    /// Used for one-line failure messages.
    pub fn summary(&self) -> String {
        let pick = |s: &str| {
            s.lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        };
        pick(&self.stderr)
            .or_else(|| pick(&self.stdout))
            .unwrap_or_else(|| format!("exit code {}", self.exit_code))
    }
}

/// Runs commands on behalf of pipeline stages
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs a command to completion
    ///
    /// A nonzero exit is reported through [`CommandOutput::exit_code`]; an
    /// `Err` means the command could not be run at all.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Executes commands as local child processes
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("Executing: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = spec.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to execute '{}'", spec.program))?;

        if let Some(ref input) = spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.expose().as_bytes())
                    .await
                    .context("Failed to write to child stdin")?;
                // Dropping closes the pipe so the child sees EOF
                drop(stdin);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for '{}'", spec.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if !stdout.trim().is_empty() {
            debug!("{} stdout: {}", spec.program, stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", spec.program, stderr.trim());
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// Checks that a tool is installed and answers `--version`
pub async fn check_tool_available(executor: &dyn CommandExecutor, program: &str) -> Result<()> {
    let output = executor
        .run(&CommandSpec::new(program).arg("--version"))
        .await
        .with_context(|| format!("Failed to execute '{} --version'. Is it installed?", program))?;

    if !output.success() {
        anyhow::bail!("{} is not working correctly: {}", program, output.summary());
    }

    info!("{} is available: {}", program, output.stdout.trim());
    Ok(())
}
