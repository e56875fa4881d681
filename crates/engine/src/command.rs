use gatewarden_core::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::exit::describe_spawn_error;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else if self.stdout.trim().is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Last few non-empty lines of stderr (or stdout when stderr is empty).
    pub fn tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = source.lines().filter(|l| !l.trim().is_empty()).collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

/// Runs one-shot engine subcommands (`doctor --fix`, `plugins ...`).
///
/// Several of them rewrite the same config file, so all runners cloned from
/// one instance share a lock and never overlap.
#[derive(Clone)]
pub struct CommandRunner {
    program: PathBuf,
    envs: HashMap<String, String>,
    timeout: Duration,
    lock: Arc<Mutex<()>>,
}

impl CommandRunner {
    pub fn new(
        program: PathBuf,
        envs: HashMap<String, String>,
        timeout: Duration,
        lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            program,
            envs,
            timeout,
            lock,
        }
    }

    pub async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let _guard = self.lock.lock().await;
        let label = args.join(" ");
        debug!(program = %self.program.display(), args = %label, "Running engine command");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .envs(&self.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(describe_spawn_error(&e, &self.program)))?;

        match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(e)) => Err(Error::Other(format!("'{}' failed: {}", label, e))),
            Err(_) => Err(Error::Timeout(format!(
                "'{}' did not finish within {}s",
                label,
                self.timeout.as_secs()
            ))),
        }
    }

    /// Like `run`, but a non-zero exit is an error carrying the output tail.
    pub async fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::Other(format!(
                "'{}' exited with {:?}: {}",
                args.join(" "),
                output.code,
                output.tail(5)
            )))
        }
    }
}
