use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Executable name, also used for the engine's state dir and log file prefix.
    #[serde(default = "default_engine_name")]
    pub name: String,
    #[serde(default = "default_npm_package")]
    pub npm_package: String,
    #[serde(default = "default_engine_port")]
    pub port: u16,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// launchd label / systemd user unit the engine may have registered itself
    /// under. `null` skips deregistration.
    #[serde(default = "default_service_label")]
    pub service_label: Option<String>,
    /// Extensions enabled on every start.
    #[serde(default = "default_required_plugins")]
    pub required_plugins: Vec<String>,
    #[serde(default = "default_home_env")]
    pub home_env: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_mode_env")]
    pub mode_env: String,
    #[serde(default = "default_mode_value")]
    pub mode_value: String,
    /// Directory holding the engine's daily log files. Defaults to `<tmp>/<name>`.
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
    #[serde(default = "default_log_buffer_capacity")]
    pub log_buffer_capacity: usize,
}

fn default_engine_name() -> String {
    "openclaw".to_string()
}

fn default_npm_package() -> String {
    "openclaw".to_string()
}

fn default_engine_port() -> u16 {
    18789
}

fn default_service_label() -> Option<String> {
    Some("ai.openclaw.gateway".to_string())
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_required_plugins() -> Vec<String> {
    vec!["feishu".to_string()]
}

fn default_home_env() -> String {
    "OPENCLAW_HOME".to_string()
}

fn default_token_env() -> String {
    "OPENCLAW_GATEWAY_TOKEN".to_string()
}

fn default_mode_env() -> String {
    "NODE_ENV".to_string()
}

fn default_mode_value() -> String {
    "production".to_string()
}

fn default_log_tail_lines() -> usize {
    100
}

fn default_log_buffer_capacity() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            npm_package: default_npm_package(),
            port: default_engine_port(),
            health_path: default_health_path(),
            service_label: default_service_label(),
            required_plugins: default_required_plugins(),
            home_env: default_home_env(),
            token_env: default_token_env(),
            mode_env: default_mode_env(),
            mode_value: default_mode_value(),
            log_dir: None,
            log_tail_lines: default_log_tail_lines(),
            log_buffer_capacity: default_log_buffer_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn log_dir(&self) -> PathBuf {
        match self.log_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => expand_home(dir),
            _ => std::env::temp_dir().join(&self.name),
        }
    }

    pub fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, self.health_path)
    }
}

/// All values in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsConfig {
    #[serde(default = "default_command_ms")]
    pub command_ms: u64,
    #[serde(default = "default_ready_ms")]
    pub ready_ms: u64,
    #[serde(default = "default_stop_ms")]
    pub stop_ms: u64,
    #[serde(default = "default_port_release_ms")]
    pub port_release_ms: u64,
    #[serde(default = "default_port_poll_ms")]
    pub port_poll_ms: u64,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_probe_grace_ms")]
    pub probe_grace_ms: u64,
    #[serde(default = "default_install_ms")]
    pub install_ms: u64,
    /// How long an upstream credential check result is reused by the probe loop.
    #[serde(default = "default_upstream_cache_ms")]
    pub upstream_cache_ms: u64,
}

fn default_command_ms() -> u64 {
    30_000
}

fn default_ready_ms() -> u64 {
    15_000
}

fn default_stop_ms() -> u64 {
    5_000
}

fn default_port_release_ms() -> u64 {
    5_000
}

fn default_port_poll_ms() -> u64 {
    500
}

fn default_probe_interval_ms() -> u64 {
    10_000
}

fn default_probe_grace_ms() -> u64 {
    3_000
}

fn default_install_ms() -> u64 {
    600_000
}

fn default_upstream_cache_ms() -> u64 {
    60_000
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            command_ms: default_command_ms(),
            ready_ms: default_ready_ms(),
            stop_ms: default_stop_ms(),
            port_release_ms: default_port_release_ms(),
            port_poll_ms: default_port_poll_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_grace_ms: default_probe_grace_ms(),
            install_ms: default_install_ms(),
            upstream_cache_ms: default_upstream_cache_ms(),
        }
    }
}

impl TimeoutsConfig {
    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    pub fn ready(&self) -> Duration {
        Duration::from_millis(self.ready_ms)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_millis(self.stop_ms)
    }

    pub fn port_release(&self) -> Duration {
        Duration::from_millis(self.port_release_ms)
    }

    pub fn port_poll(&self) -> Duration {
        Duration::from_millis(self.port_poll_ms.max(10))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms.max(100))
    }

    pub fn probe_grace(&self) -> Duration {
        Duration::from_millis(self.probe_grace_ms)
    }

    pub fn install(&self) -> Duration {
        Duration::from_millis(self.install_ms)
    }

    pub fn upstream_cache(&self) -> Duration {
        Duration::from_millis(self.upstream_cache_ms)
    }
}

/// Feishu / Lark application credentials, used for the direct upstream check
/// and written into the engine's native config.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeishuConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_secret: String,
    /// "feishu" (open.feishu.cn) or "lark" (open.larksuite.com).
    #[serde(default = "default_feishu_domain")]
    pub domain: String,
}

fn default_feishu_domain() -> String {
    "feishu".to_string()
}

impl FeishuConfig {
    pub fn is_configured(&self) -> bool {
        !self.app_id.trim().is_empty() && !self.app_secret.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub feishu: FeishuConfig,
}

/// Keyword lists used to classify engine log lines. Matching is
/// case-insensitive substring matching; the engine's wording drifts between
/// releases, so these live in config rather than code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    /// Any line containing one of these marks the gateway as up during start.
    #[serde(default = "default_ready_phrases")]
    pub ready: Vec<String>,
    #[serde(default = "default_active_phrases")]
    pub active: Vec<String>,
    #[serde(default = "default_permission_phrases")]
    pub permission: Vec<String>,
    #[serde(default = "default_connected_phrases")]
    pub connected: Vec<String>,
    #[serde(default = "default_fatal_phrases")]
    pub fatal: Vec<String>,
    /// Connected/fatal phrases only count on lines mentioning the connector.
    #[serde(default = "default_connector_markers")]
    pub connector_markers: Vec<String>,
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_ready_phrases() -> Vec<String> {
    to_strings(&["listening on", "gateway ready", "gateway started", "server started"])
}

fn default_active_phrases() -> Vec<String> {
    to_strings(&[
        "message received",
        "received message",
        "dispatching",
        "dispatched",
        "delivered",
        "reply sent",
        "channel active",
    ])
}

fn default_permission_phrases() -> Vec<String> {
    to_strings(&[
        "permission denied",
        "no permission",
        "insufficient permission",
        "missing permission",
        "access denied",
        "99991672",
    ])
}

fn default_connected_phrases() -> Vec<String> {
    to_strings(&["connected", "ready", "online", "ws client started", "started"])
}

fn default_fatal_phrases() -> Vec<String> {
    to_strings(&[
        "not enabled",
        "disconnected",
        "failed to start",
        "channel stopped",
        "extension missing",
        "plugin not found",
        "invalid app",
        "connection closed",
    ])
}

fn default_connector_markers() -> Vec<String> {
    to_strings(&["feishu", "lark", "channel", "connector", "websocket", "ws client"])
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            ready: default_ready_phrases(),
            active: default_active_phrases(),
            permission: default_permission_phrases(),
            connected: default_connected_phrases(),
            fatal: default_fatal_phrases(),
            connector_markers: default_connector_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.engine.name, "openclaw");
        assert_eq!(cfg.engine.port, 18789);
        assert_eq!(cfg.timeouts.command_ms, 30_000);
        assert_eq!(cfg.timeouts.ready_ms, 15_000);
        assert_eq!(cfg.engine.log_buffer_capacity, 100);
        assert!(!cfg.classifier.fatal.is_empty());
    }

    #[test]
    fn test_camel_case_fields() {
        let raw = r#"{
  "engine": { "port": 20001, "requiredPlugins": ["feishu", "memory-core"], "serviceLabel": "ai.openclaw.gateway" },
  "channels": { "feishu": { "enabled": true, "appId": "cli_a", "appSecret": "s" } },
  "timeouts": { "readyMs": 250 }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.engine.port, 20001);
        assert_eq!(cfg.engine.required_plugins.len(), 2);
        assert_eq!(cfg.engine.service_label.as_deref(), Some("ai.openclaw.gateway"));
        assert!(cfg.channels.feishu.is_configured());
        assert_eq!(cfg.channels.feishu.domain, "feishu");
        assert_eq!(cfg.timeouts.ready(), Duration::from_millis(250));
        assert_eq!(cfg.timeouts.stop_ms, 5_000);
    }

    #[test]
    fn test_service_label_defaults_to_engine_unit() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.engine.service_label.as_deref(), Some("ai.openclaw.gateway"));
        assert_eq!(Config::default().engine.service_label, cfg.engine.service_label);
        assert_eq!(cfg.timeouts.upstream_cache(), Duration::from_secs(60));

        let cfg: Config = serde_json::from_str(r#"{"engine": {"serviceLabel": null}}"#).unwrap();
        assert!(cfg.engine.service_label.is_none());
    }

    #[test]
    fn test_health_url_and_log_dir() {
        let mut cfg = Config::default();
        assert_eq!(cfg.engine.health_url(), "http://127.0.0.1:18789/health");
        assert_eq!(cfg.engine.log_dir(), std::env::temp_dir().join("openclaw"));
        cfg.engine.log_dir = Some("/var/log/engine".to_string());
        assert_eq!(cfg.engine.log_dir(), PathBuf::from("/var/log/engine"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut cfg = Config::default();
        cfg.engine.port = 1234;
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.engine.port, 1234);
    }
}
