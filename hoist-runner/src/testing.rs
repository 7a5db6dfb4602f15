//! Scripted fakes for the process and remote seams

use anyhow::Result;
use async_trait::async_trait;
use hoist_core::domain::target::DeployTarget;
use std::sync::{Arc, Mutex};

use crate::process::{CommandExecutor, CommandOutput, CommandSpec};
use crate::remote::{RemoteSession, RemoteShell};

fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code,
    }
}

/// Canned outputs keyed by command line prefix; unmatched commands succeed
#[derive(Clone, Default)]
struct Script(Vec<(String, CommandOutput)>);

impl Script {
    fn push(&mut self, prefix: &str, output: CommandOutput) {
        self.0.push((prefix.to_string(), output));
    }

    fn answer(&self, line: &str) -> CommandOutput {
        self.0
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default()
    }
}

/// Records every command and answers from a script
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Script,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, prefix: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.script.push(prefix, output(exit_code, stdout, stderr));
        self
    }

    pub fn fail_on(self, prefix: &str, exit_code: i32, stderr: &str) -> Self {
        self.respond(prefix, exit_code, "", stderr)
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        Ok(self.script.answer(&spec.display()))
    }
}

#[derive(Default)]
struct ShellLog {
    commands: Vec<String>,
    opened: usize,
    closed: usize,
}

/// In-memory remote shell
pub struct FakeShell {
    script: Script,
    reachable: bool,
    log: Arc<Mutex<ShellLog>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self {
            script: Script::default(),
            reachable: true,
            log: Arc::default(),
        }
    }

    /// A shell whose every connection attempt fails
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    pub fn respond(mut self, prefix: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.script.push(prefix, output(exit_code, stdout, stderr));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().commands.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.log.lock().unwrap().opened
    }

    pub fn all_closed(&self) -> bool {
        let log = self.log.lock().unwrap();
        log.opened == log.closed
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn connect(&self, _target: &DeployTarget) -> Result<Box<dyn RemoteSession>> {
        if !self.reachable {
            anyhow::bail!("ssh: connect to host port 22: Connection timed out");
        }
        self.log.lock().unwrap().opened += 1;
        Ok(Box::new(FakeSession {
            script: self.script.clone(),
            log: self.log.clone(),
        }))
    }
}

struct FakeSession {
    script: Script,
    log: Arc<Mutex<ShellLog>>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn exec(&mut self, argv: &[String]) -> Result<CommandOutput> {
        let line = argv.join(" ");
        self.log.lock().unwrap().commands.push(line.clone());
        Ok(self.script.answer(&line))
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}
