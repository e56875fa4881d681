use std::path::PathBuf;

/// Filesystem layout of the supervisor's private state directory.
///
/// The engine gets its own home directory (`engine_home`) inside the base dir.
/// The engine appends `.<name>` to whatever home it is given, so the override
/// must point at `engine_home`, never at `engine_state_dir`.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".gatewarden"))
            .unwrap_or_else(|| PathBuf::from(".gatewarden"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Prefix used for `npm install --prefix`; the engine lands in
    /// `node_modules/.bin` underneath it.
    pub fn local_install_dir(&self) -> PathBuf {
        self.base.join("engine-runtime")
    }

    pub fn local_bin_dir(&self) -> PathBuf {
        self.local_install_dir().join("node_modules").join(".bin")
    }

    /// Value of the engine's home-directory override.
    pub fn engine_home(&self) -> PathBuf {
        self.base.join("engine")
    }

    /// Directory the engine itself creates under its home.
    pub fn engine_state_dir(&self, engine_name: &str) -> PathBuf {
        self.engine_home().join(format!(".{}", engine_name))
    }

    pub fn engine_config_file(&self, engine_name: &str) -> PathBuf {
        self.engine_state_dir(engine_name)
            .join(format!("{}.json", engine_name))
    }

    /// Bundled engine distribution shipped next to the supervisor binary.
    ///
    /// Candidates, first existing wins:
    /// 1. exe/../resources/engine (installed layout)
    /// 2. exe/../../resources/engine (cargo layout: target/debug/gatewarden)
    /// 3. ./resources/engine
    pub fn bundled_dir(&self) -> PathBuf {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(exe_dir) = exe.parent() {
                for relative in &["../resources/engine", "../../resources/engine"] {
                    let candidate = exe_dir.join(relative);
                    if candidate.is_dir() {
                        return candidate;
                    }
                }
            }
        }
        PathBuf::from("./resources/engine")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.engine_home())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_home_is_parent_of_state_dir() {
        let paths = Paths::with_base(PathBuf::from("/tmp/gw"));
        assert_eq!(paths.engine_home(), PathBuf::from("/tmp/gw/engine"));
        assert_eq!(
            paths.engine_state_dir("openclaw"),
            PathBuf::from("/tmp/gw/engine/.openclaw")
        );
        assert_eq!(
            paths.engine_config_file("openclaw"),
            PathBuf::from("/tmp/gw/engine/.openclaw/openclaw.json")
        );
    }

    #[test]
    fn test_local_bin_dir() {
        let paths = Paths::with_base(PathBuf::from("/tmp/gw"));
        assert_eq!(
            paths.local_bin_dir(),
            PathBuf::from("/tmp/gw/engine-runtime/node_modules/.bin")
        );
    }
}
