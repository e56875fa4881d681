use gatewarden_core::{Config, Paths};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::resolver::{EngineLocation, Resolver};

/// Build `PATH` for the engine: bundled bins, the engine's own directory and
/// the local install first, then the inherited entries, then conventional
/// fallbacks. Duplicates keep their first position.
pub fn augmented_path(
    resolver: &Resolver,
    location: Option<&EngineLocation>,
    inherited: Option<OsString>,
) -> OsString {
    let mut ordered: Vec<PathBuf> = Vec::new();
    ordered.extend(resolver.bundled_bin_dirs());
    if let Some(dir) = location.and_then(|l| l.dir()) {
        ordered.push(dir.to_path_buf());
    }
    ordered.push(resolver.local_bin_dir().to_path_buf());
    if let Some(inherited) = inherited.as_ref() {
        ordered.extend(std::env::split_paths(inherited));
    }
    ordered.extend(resolver.conventional().iter().cloned());

    let mut seen = HashSet::new();
    let deduped: Vec<PathBuf> = ordered
        .into_iter()
        .filter(|p| !p.as_os_str().is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect();

    // join_paths rejects entries containing the separator; drop those instead of failing.
    std::env::join_paths(&deduped).unwrap_or_else(|_| {
        let valid: Vec<&PathBuf> = deduped
            .iter()
            .filter(|p| std::env::join_paths([p]).is_ok())
            .collect();
        std::env::join_paths(valid).unwrap_or_default()
    })
}

/// Variables layered over the inherited environment when launching the engine
/// or any of its subcommands.
pub fn engine_env(
    config: &Config,
    paths: &Paths,
    resolver: &Resolver,
    location: Option<&EngineLocation>,
    token: &str,
) -> HashMap<String, String> {
    let mut envs = HashMap::new();
    let path = augmented_path(resolver, location, std::env::var_os("PATH"));
    envs.insert("PATH".to_string(), path.to_string_lossy().into_owned());
    // The engine appends `.<name>` itself; pointing this at the state dir would nest it twice.
    envs.insert(
        config.engine.home_env.clone(),
        paths.engine_home().to_string_lossy().into_owned(),
    );
    envs.insert(config.engine.token_env.clone(), token.to_string());
    if !config.engine.mode_env.is_empty() {
        envs.insert(config.engine.mode_env.clone(), config.engine.mode_value.clone());
    }
    envs
}

/// Fresh bearer token for local calls to the engine.
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
