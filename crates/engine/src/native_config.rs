use gatewarden_core::{Config, Error, Paths, Result};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

fn object_entry<'a>(parent: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Merges the supervisor-owned keys into an existing native config document.
/// Everything else in the document is left alone.
pub fn merge_native_config(existing: Value, config: &Config, token: &str) -> Value {
    let mut root = match existing {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    {
        let gateway = object_entry(&mut root, "gateway");
        gateway.insert("port".to_string(), json!(config.engine.port));
        gateway
            .entry("mode".to_string())
            .or_insert_with(|| json!("local"));
        let auth = object_entry(gateway, "auth");
        auth.insert("mode".to_string(), json!("token"));
        auth.insert("token".to_string(), json!(token));
    }

    let feishu = &config.channels.feishu;
    if feishu.is_configured() {
        let channels = object_entry(&mut root, "channels");
        let entry = object_entry(channels, "feishu");
        entry.insert("enabled".to_string(), json!(feishu.enabled));
        entry.insert("appId".to_string(), json!(feishu.app_id));
        entry.insert("appSecret".to_string(), json!(feishu.app_secret));
        entry.insert("domain".to_string(), json!(feishu.domain));
    }

    Value::Object(root)
}

/// Regenerates `<engine_home>/.<name>/<name>.json`. An unreadable existing file
/// is replaced rather than merged.
pub fn write_native_config(config: &Config, paths: &Paths, token: &str) -> Result<PathBuf> {
    let path = paths.engine_config_file(&config.engine.name);
    let existing = read_json(&path).unwrap_or(Value::Null);
    let merged = merge_native_config(existing, config, token);

    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&merged)?;
        std::fs::write(&path, content)
    };
    write().map_err(|e| Error::ConfigWrite(format!("{}: {}", path.display(), e)))?;

    debug!(path = %path.display(), "Native engine config written");
    Ok(path)
}

/// Bearer token from an existing native config, used by one-shot status checks.
pub fn read_token(config: &Config, paths: &Paths) -> Option<String> {
    let value = read_json(&paths.engine_config_file(&config.engine.name))?;
    value
        .pointer("/gateway/auth/token")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn read_json(path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
