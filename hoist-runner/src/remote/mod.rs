//! Remote command sessions
//!
//! The deployer talks to the target host through a [`RemoteShell`], which
//! opens exactly one [`RemoteSession`] per deployment. Commands are passed as
//! argument vectors and quoted for the remote shell by the session.

mod ssh;

pub use ssh::SshShell;

use anyhow::Result;
use async_trait::async_trait;
use hoist_core::domain::target::DeployTarget;

use crate::process::CommandOutput;

/// Opens remote sessions on deploy targets
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Establishes an authenticated session
    ///
    /// Any error here means the session could not be established.
    async fn connect(&self, target: &DeployTarget) -> Result<Box<dyn RemoteSession>>;
}

/// An established session on a deploy target
#[async_trait]
pub trait RemoteSession: Send {
    /// Runs one command on the target
    ///
    /// A nonzero exit is reported through the output; an `Err` means the
    /// command could not be delivered.
    async fn exec(&mut self, argv: &[String]) -> Result<CommandOutput>;

    /// Closes the session
    async fn close(&mut self) -> Result<()>;
}

/// Quotes one argument for a POSIX shell
///
/// Arguments made only of safe characters are left untouched.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));

    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Joins an argument vector into one shell command line
pub fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}
