use gatewarden_core::{Config, Error, Paths, Result};
use serde::Serialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::env::augmented_path;
use crate::resolver::{EngineLocation, Resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    Checking,
    Downloading,
    Installing,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallProgress {
    pub phase: InstallPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
}

impl InstallProgress {
    pub fn new(phase: InstallPhase, message: impl Into<String>, percent: Option<u8>) -> Self {
        Self {
            phase,
            message: message.into(),
            percent,
        }
    }
}

/// Installs the engine's npm package into the private local prefix.
pub struct Installer {
    config: Config,
    paths: Paths,
    resolver: Resolver,
}

impl Installer {
    pub fn new(config: Config, paths: Paths, resolver: Resolver) -> Self {
        Self {
            config,
            paths,
            resolver,
        }
    }

    pub async fn install(&self, progress: mpsc::Sender<InstallProgress>) -> Result<EngineLocation> {
        let emit = |p: InstallProgress| {
            let tx = progress.clone();
            async move {
                // Receiver may have gone away; installation carries on regardless.
                let _ = tx.send(p).await;
            }
        };

        let name = &self.config.engine.name;
        emit(InstallProgress::new(
            InstallPhase::Checking,
            format!("Looking for an existing {}", name),
            Some(0),
        ))
        .await;

        if let Some(location) = self.resolver.resolve(name) {
            emit(InstallProgress::new(
                InstallPhase::Done,
                format!("{} already available at {}", name, location.path.display()),
                Some(100),
            ))
            .await;
            return Ok(location);
        }

        match self.run_npm(&emit).await {
            Ok(location) => {
                emit(InstallProgress::new(
                    InstallPhase::Done,
                    format!("Installed {} at {}", name, location.path.display()),
                    Some(100),
                ))
                .await;
                Ok(location)
            }
            Err(e) => {
                emit(InstallProgress::new(InstallPhase::Error, e.to_string(), None)).await;
                Err(e)
            }
        }
    }

    async fn run_npm<F, Fut>(&self, emit: &F) -> Result<EngineLocation>
    where
        F: Fn(InstallProgress) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let path_var = augmented_path(&self.resolver, None, std::env::var_os("PATH"));
        let cwd = std::env::current_dir().unwrap_or_else(|_| self.paths.base.clone());
        let npm = which::which_in("npm", Some(&path_var), cwd).map_err(|_| {
            Error::Install("npm was not found; install Node.js (which provides npm) first".to_string())
        })?;

        let prefix = self.paths.local_install_dir();
        std::fs::create_dir_all(&prefix)?;
        let package = &self.config.engine.npm_package;

        emit(InstallProgress::new(
            InstallPhase::Downloading,
            format!("npm install {}", package),
            Some(10),
        ))
        .await;
        info!(npm = %npm.display(), prefix = %prefix.display(), package = %package, "Installing engine");

        let mut child = Command::new(&npm)
            .arg("install")
            .arg("--prefix")
            .arg(&prefix)
            .arg("--no-audit")
            .arg("--no-fund")
            .arg(package)
            .env("PATH", &path_var)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Install(format!("failed to run npm: {}", e)))?;

        let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = tx.send(line).await;
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = tx.send(line).await;
                }
            });
        }
        drop(line_tx);

        let mut tail: Vec<String> = Vec::new();
        let pump = async {
            let mut percent: u8 = 20;
            while let Some(line) = line_rx.recv().await {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                debug!(target: "engine", "npm: {}", line);
                percent = (percent + 5).min(90);
                emit(InstallProgress::new(InstallPhase::Installing, line.clone(), Some(percent))).await;
                tail.push(line);
                if tail.len() > 10 {
                    tail.remove(0);
                }
            }
            child.wait().await
        };

        let status = match tokio::time::timeout(self.config.timeouts.install(), pump).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(Error::Install(format!("npm did not finish: {}", e))),
            Err(_) => {
                warn!("npm install timed out");
                return Err(Error::Install(format!(
                    "npm install timed out after {}s",
                    self.config.timeouts.install().as_secs()
                )));
            }
        };

        if !status.success() {
            return Err(Error::Install(format!(
                "npm install exited with {}: {}",
                status,
                tail.join("\n")
            )));
        }

        self.resolver.resolve(&self.config.engine.name).ok_or_else(|| {
            Error::Install(format!(
                "npm finished but no '{}' executable appeared in {}",
                self.config.engine.name,
                self.paths.local_bin_dir().display()
            ))
        })
    }
}
