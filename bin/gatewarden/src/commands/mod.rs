pub mod doctor;
pub mod install;
pub mod logs_cmd;
pub mod plugins;
pub mod run;
pub mod status;

use gatewarden_core::{Config, Paths};
use gatewarden_engine::Supervisor;

/// Loads config from the private state dir and builds a supervisor for one command.
pub fn load_supervisor() -> anyhow::Result<(Config, Paths, Supervisor)> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;
    let supervisor = Supervisor::new(config.clone(), paths.clone());
    Ok((config, paths, supervisor))
}
