//! SSH remote sessions
//!
//! Each deployment starts one OpenSSH control master and multiplexes every
//! command over its socket, so the target sees a single authenticated
//! connection. The private key, control socket and known-hosts file live in
//! a private temporary directory that is removed when the session is dropped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hoist_core::domain::credential::Secret;
use hoist_core::domain::target::DeployTarget;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{RemoteSession, RemoteShell, shell_join};
use crate::process::CommandOutput;

/// Opens sessions with the system `ssh` client
#[derive(Debug, Clone)]
pub struct SshShell {
    program: String,
    connect_timeout: Duration,
    poll_interval: Duration,
}

impl SshShell {
    pub fn new() -> Self {
        Self {
            program: "ssh".to_string(),
            connect_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Asks the control master whether it is ready
    async fn master_ready(&self, socket: &Path, destination: &str) -> bool {
        Command::new(&self.program)
            .arg("-S")
            .arg(socket)
            .args(["-O", "check"])
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl Default for SshShell {
    fn default() -> Self {
        Self::new()
    }
}

/// Files backing one session
struct SessionFiles {
    // Held for its Drop, which deletes the key material
    _dir: TempDir,
    key: PathBuf,
    socket: PathBuf,
    known_hosts: PathBuf,
}

impl SessionFiles {
    fn create(private_key: &Secret) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("hoist-ssh-")
            .tempdir()
            .context("Failed to create session directory")?;

        let key = dir.path().join("id");
        write_private(&key, private_key)?;

        Ok(Self {
            key,
            socket: dir.path().join("ctl"),
            known_hosts: dir.path().join("known_hosts"),
            _dir: dir,
        })
    }
}

/// Writes key material readable by the owner only
fn write_private(path: &Path, key: &Secret) -> Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).context("Failed to create key file")?;
    file.write_all(key.expose().trim_end().as_bytes())
        .context("Failed to write key file")?;
    // OpenSSH rejects keys without a trailing newline
    file.write_all(b"\n").context("Failed to write key file")?;
    Ok(())
}

/// Arguments for the control master, without the destination
fn master_args(files: &SessionFiles, port: u16, connect_timeout: Duration) -> Vec<String> {
    vec![
        "-M".to_string(),
        "-N".to_string(),
        "-S".to_string(),
        files.socket.display().to_string(),
        "-i".to_string(),
        files.key.display().to_string(),
        "-p".to_string(),
        port.to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "IdentitiesOnly=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        format!("UserKnownHostsFile={}", files.known_hosts.display()),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)),
        "-o".to_string(),
        "ServerAliveInterval=15".to_string(),
    ]
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn connect(&self, target: &DeployTarget) -> Result<Box<dyn RemoteSession>> {
        let files = SessionFiles::create(&target.private_key)?;
        let destination = format!("{}@{}", target.user.expose(), target.host.expose());

        debug!("Starting ssh control master");
        let mut master = Command::new(&self.program)
            .args(master_args(&files, target.port, self.connect_timeout))
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            if let Some(status) = master.try_wait().context("Failed to poll ssh")? {
                let mut stderr = String::new();
                if let Some(mut pipe) = master.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                anyhow::bail!("ssh exited with {}: {}", status, stderr.trim());
            }

            if self.master_ready(&files.socket, &destination).await {
                break;
            }

            if Instant::now() >= deadline {
                anyhow::bail!(
                    "no ssh session after {}s",
                    self.connect_timeout.as_secs()
                );
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        info!("Remote session established on port {}", target.port);

        Ok(Box::new(SshSession {
            program: self.program.clone(),
            destination,
            files,
            master: Some(master),
        }))
    }
}

/// Commands multiplexed over a running control master
struct SshSession {
    program: String,
    destination: String,
    files: SessionFiles,
    master: Option<Child>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, argv: &[String]) -> Result<CommandOutput> {
        let remote = shell_join(argv);
        debug!("Remote exec: {}", remote);

        let output = Command::new(&self.program)
            .arg("-S")
            .arg(&self.files.socket)
            .args(["-T", "-o", "BatchMode=yes"])
            .arg(&self.destination)
            .arg(&remote)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute ssh")?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut master) = self.master.take() else {
            return Ok(());
        };

        let exit = Command::new(&self.program)
            .arg("-S")
            .arg(&self.files.socket)
            .args(["-O", "exit"])
            .arg(&self.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if !matches!(exit, Ok(status) if status.success()) {
            warn!("ssh control master did not exit cleanly, killing it");
        }

        if tokio::time::timeout(Duration::from_secs(5), master.wait())
            .await
            .is_err()
        {
            master.kill().await.context("Failed to kill ssh control master")?;
        }

        debug!("Remote session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_file_is_private_and_newline_terminated() {
        let key = Secret::new("-----BEGIN KEY-----\nabc\n-----END KEY-----");
        let files = SessionFiles::create(&key).unwrap();
        let written = std::fs::read_to_string(&files.key).unwrap();
        assert!(written.ends_with("-----END KEY-----\n"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&files.key).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_session_files_removed_on_drop() {
        let files = SessionFiles::create(&Secret::new("key")).unwrap();
        let key = files.key.clone();
        assert!(key.exists());
        drop(files);
        assert!(!key.exists());
    }

    #[test]
    fn test_master_args() {
        let files = SessionFiles::create(&Secret::new("key")).unwrap();
        let args = master_args(&files, 2222, Duration::from_secs(10));

        assert_eq!(&args[..2], &["-M", "-N"]);
        let port_idx = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[port_idx + 1], "2222");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(args.contains(&files.key.display().to_string()));
    }

    #[tokio::test]
    async fn test_missing_ssh_binary_fails_to_connect() {
        let shell = SshShell {
            program: "hoist-no-such-ssh".to_string(),
            connect_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        };
        let target = DeployTarget::new("127.0.0.1", "nobody", "key");
        assert!(shell.connect(&target).await.is_err());
    }
}
