use gatewarden_core::config::ClassifierConfig;
use serde::Serialize;

/// Connectivity signal carried by a single piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Messages are flowing through the connector.
    Active,
    Connected,
    PermissionWarning,
    FatalError,
    Unknown,
}

impl Signal {
    pub fn is_positive(self) -> bool {
        matches!(self, Signal::Active | Signal::Connected | Signal::PermissionWarning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    StreamTap,
    HttpProbe,
    LogFile,
    Upstream,
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EvidenceSource::StreamTap => "stdout",
            EvidenceSource::HttpProbe => "http",
            EvidenceSource::LogFile => "logfile",
            EvidenceSource::Upstream => "upstream",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub source: EvidenceSource,
    pub signal: Signal,
    pub raw_text: String,
}

impl Evidence {
    pub fn new(source: EvidenceSource, signal: Signal, raw_text: impl Into<String>) -> Self {
        Self {
            source,
            signal,
            raw_text: raw_text.into(),
        }
    }
}

/// Keyword classifier shared by the stdout tap and the log-file tail.
#[derive(Debug, Clone)]
pub struct Classifier {
    ready: Vec<String>,
    active: Vec<String>,
    permission: Vec<String>,
    connected: Vec<String>,
    fatal: Vec<String>,
    connector_markers: Vec<String>,
}

fn lowered(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            ready: lowered(&config.ready),
            active: lowered(&config.active),
            permission: lowered(&config.permission),
            connected: lowered(&config.connected),
            fatal: lowered(&config.fatal),
            connector_markers: lowered(&config.connector_markers),
        }
    }

    pub fn is_ready(&self, line: &str) -> bool {
        contains_any(&line.to_lowercase(), &self.ready)
    }

    /// Whether the line talks about the chat connector at all.
    pub fn is_connector_line(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        contains_any(&lower, &self.connector_markers)
            || contains_any(&lower, &self.active)
            || contains_any(&lower, &self.permission)
    }

    pub fn classify(&self, line: &str) -> Signal {
        let lower = line.to_lowercase();
        if contains_any(&lower, &self.active) {
            return Signal::Active;
        }
        if contains_any(&lower, &self.permission) {
            return Signal::PermissionWarning;
        }
        if !contains_any(&lower, &self.connector_markers) {
            return Signal::Unknown;
        }
        // Fatal before connected: "disconnected" contains "connected".
        if contains_any(&lower, &self.fatal) {
            return Signal::FatalError;
        }
        if contains_any(&lower, &self.connected) {
            return Signal::Connected;
        }
        Signal::Unknown
    }

    pub fn evidence(&self, source: EvidenceSource, line: &str) -> Evidence {
        Evidence::new(source, self.classify(line), line.trim())
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_traffic() {
        let c = Classifier::default();
        assert_eq!(c.classify("[feishu] message received from ou_123"), Signal::Active);
        assert_eq!(c.classify("Dispatching reply to chat oc_1"), Signal::Active);
    }

    #[test]
    fn test_disconnected_is_fatal_not_connected() {
        let c = Classifier::default();
        assert_eq!(c.classify("[feishu] websocket disconnected"), Signal::FatalError);
        assert_eq!(c.classify("[feishu] WebSocket connected"), Signal::Connected);
    }

    #[test]
    fn test_connected_requires_connector_marker() {
        let c = Classifier::default();
        assert_eq!(c.classify("database connected"), Signal::Unknown);
        assert_eq!(c.classify("gateway started on :18789"), Signal::Unknown);
    }

    #[test]
    fn test_permission_warning() {
        let c = Classifier::default();
        assert_eq!(
            c.classify("feishu api error 99991672: Access denied, scope missing"),
            Signal::PermissionWarning
        );
    }

    #[test]
    fn test_custom_phrases() {
        let mut cfg = ClassifierConfig::default();
        cfg.fatal = vec!["Kaputt".to_string()];
        let c = Classifier::new(&cfg);
        assert_eq!(c.classify("feishu connector KAPUTT"), Signal::FatalError);
    }

    #[test]
    fn test_ready_phrase() {
        let c = Classifier::default();
        assert!(c.is_ready("[gateway] listening on ws://127.0.0.1:18789"));
        assert!(!c.is_ready("loading config"));
    }
}
