use gatewarden_core::{Error, Paths, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSource {
    Bundled,
    Local,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineLocation {
    pub path: PathBuf,
    pub source: EngineSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl EngineLocation {
    pub fn dir(&self) -> Option<&Path> {
        self.path.parent()
    }
}

/// Locates the engine executable. Pure filesystem probing, nothing is cached.
///
/// Search order, first hit wins:
/// 1. bundled distribution next to the supervisor
/// 2. local install under the private state dir
/// 3. `PATH`
/// 4. conventional install prefixes
/// 5. newest nvm-style `versions/node/<v>/bin`
#[derive(Debug, Clone)]
pub struct Resolver {
    bundled_dir: PathBuf,
    local_bin_dir: PathBuf,
    search_path: Option<OsString>,
    conventional_dirs: Vec<PathBuf>,
    nvm_root: Option<PathBuf>,
}

impl Resolver {
    pub fn new(paths: &Paths) -> Self {
        Self {
            bundled_dir: paths.bundled_dir(),
            local_bin_dir: paths.local_bin_dir(),
            search_path: std::env::var_os("PATH"),
            conventional_dirs: conventional_dirs(),
            nvm_root: dirs::home_dir().map(|h| h.join(".nvm").join("versions").join("node")),
        }
    }

    /// Only the bundled and local locations; nothing from the host system.
    pub fn isolated(paths: &Paths) -> Self {
        Self {
            bundled_dir: paths.bundled_dir(),
            local_bin_dir: paths.local_bin_dir(),
            search_path: None,
            conventional_dirs: Vec::new(),
            nvm_root: None,
        }
    }

    pub fn with_bundled_dir(mut self, dir: PathBuf) -> Self {
        self.bundled_dir = dir;
        self
    }

    pub fn with_search_path(mut self, path: Option<OsString>) -> Self {
        self.search_path = path;
        self
    }

    pub fn with_conventional_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.conventional_dirs = dirs;
        self
    }

    pub fn with_nvm_root(mut self, root: Option<PathBuf>) -> Self {
        self.nvm_root = root;
        self
    }

    pub fn bundled_bin_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.bundled_dir.join("bin"),
            self.bundled_dir.join("node_modules").join(".bin"),
            self.bundled_dir.clone(),
        ]
    }

    pub fn local_bin_dir(&self) -> &Path {
        &self.local_bin_dir
    }

    pub fn conventional(&self) -> &[PathBuf] {
        &self.conventional_dirs
    }

    pub fn resolve(&self, name: &str) -> Option<EngineLocation> {
        let found = |path: PathBuf, source: EngineSource| {
            debug!(path = %path.display(), ?source, "Engine executable resolved");
            Some(EngineLocation {
                path,
                source,
                version: None,
            })
        };

        for dir in self.bundled_bin_dirs() {
            if let Some(path) = find_in_dir(&dir, name) {
                return found(path, EngineSource::Bundled);
            }
        }

        if let Some(path) = find_in_dir(&self.local_bin_dir, name) {
            return found(path, EngineSource::Local);
        }

        if let Some(search_path) = self.search_path.as_ref() {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if let Ok(path) = which::which_in(name, Some(search_path), cwd) {
                return found(path, EngineSource::Global);
            }
        }

        for dir in &self.conventional_dirs {
            if let Some(path) = find_in_dir(dir, name) {
                return found(path, EngineSource::Global);
            }
        }

        if let Some(root) = self.nvm_root.as_ref() {
            for version_dir in version_dirs_desc(root) {
                if let Some(path) = find_in_dir(&version_dir.join("bin"), name) {
                    return found(path, EngineSource::Global);
                }
            }
        }

        None
    }

    pub fn resolve_required(&self, name: &str) -> Result<EngineLocation> {
        self.resolve(name).ok_or_else(|| {
            Error::Resolution(format!(
                "'{}' was not found in the bundled, local or global locations; install it first",
                name
            ))
        })
    }
}

/// Runs `<bin> --version`; `None` when the binary does not answer in time.
pub async fn detect_version(
    location: &EngineLocation,
    envs: &std::collections::HashMap<String, String>,
    timeout_dur: Duration,
) -> Option<String> {
    let result = tokio::time::timeout(
        timeout_dur,
        tokio::process::Command::new(&location.path)
            .arg("--version")
            .envs(envs)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout);
            text.lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(|l| l.to_string())
        }
        Ok(Ok(output)) => {
            debug!(status = %output.status, "Engine --version returned non-zero");
            None
        }
        Ok(Err(e)) => {
            debug!(error = %e, "Engine --version failed to run");
            None
        }
        Err(_) => {
            debug!("Engine --version timed out");
            None
        }
    }
}

fn executable_names(name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![format!("{}.cmd", name), format!("{}.exe", name), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}

fn find_in_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    executable_names(name)
        .into_iter()
        .map(|n| dir.join(n))
        .find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Child directories of `root`, newest first by lexicographic-descending name.
fn version_dirs_desc(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    dirs
}

/// Package-manager and version-manager prefixes a GUI-launched process
/// usually does not have on its PATH.
pub fn conventional_dirs() -> Vec<PathBuf> {
    let mut dirs_out = Vec::new();
    if cfg!(windows) {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            dirs_out.push(PathBuf::from(appdata).join("npm"));
        }
        return dirs_out;
    }

    dirs_out.push(PathBuf::from("/opt/homebrew/bin"));
    dirs_out.push(PathBuf::from("/usr/local/bin"));
    if let Some(home) = dirs::home_dir() {
        dirs_out.push(home.join(".npm-global").join("bin"));
        dirs_out.push(home.join(".local").join("bin"));
        dirs_out.push(home.join(".volta").join("bin"));
        dirs_out.push(home.join(".bun").join("bin"));
        dirs_out.push(home.join(".local").join("share").join("pnpm"));
        dirs_out.push(home.join("Library").join("pnpm"));
    }
    dirs_out.push(PathBuf::from("/usr/bin"));
    dirs_out.push(PathBuf::from("/bin"));
    dirs_out
}
