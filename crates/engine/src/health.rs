//! Combines the periodic channels (HTTP probe, log-file tail, upstream check)
//! with the stream-tap verdict into one assessment plus a readable trail.

use gatewarden_channels::{CredentialCheck, UpstreamStatus};
use gatewarden_core::{Config, Paths};
use serde::Serialize;

use crate::classify::Classifier;
use crate::env::engine_env;
use crate::fusion::{fuse, Connectivity};
use crate::logfile::{LogFileReading, LogFileTail};
use crate::native_config::read_token;
use crate::port::is_port_in_use;
use crate::probe::{HttpProbe, ProbeResult};
use crate::resolver::{detect_version, EngineLocation, Resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Connected,
    ConnectedWithWarning,
    Disconnected,
    /// The platform accepts the credentials but no log evidence shows the
    /// connector came up.
    CredentialsValidUnconfirmed,
    /// Credentials accepted, but the app's bot could not be looked up.
    CredentialsValidBotUnavailable,
    CredentialsInvalid,
    Unconfirmed,
}

impl HealthVerdict {
    pub fn label(self) -> &'static str {
        match self {
            HealthVerdict::Connected => "connected",
            HealthVerdict::ConnectedWithWarning => "connected (with warning)",
            HealthVerdict::Disconnected => "disconnected",
            HealthVerdict::CredentialsValidUnconfirmed => "credentials valid, connector unconfirmed",
            HealthVerdict::CredentialsValidBotUnavailable => "credentials valid, bot unavailable",
            HealthVerdict::CredentialsInvalid => "credentials invalid",
            HealthVerdict::Unconfirmed => "connectivity unconfirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthAssessment {
    pub verdict: HealthVerdict,
    pub connectivity: Connectivity,
    pub trail: Vec<String>,
}

impl HealthAssessment {
    pub fn detail(&self) -> String {
        self.trail.join(" | ")
    }
}

/// Whether the upstream check is worth calling for this connectivity.
pub fn needs_upstream(connectivity: &Connectivity) -> bool {
    !connectivity.has_verdict()
}

pub fn assess(
    prior: &Connectivity,
    probe: Option<&ProbeResult>,
    file: Option<&LogFileReading>,
    upstream: Option<&UpstreamStatus>,
) -> HealthAssessment {
    let mut trail = Vec::new();
    if prior.has_verdict() {
        if let Some(source) = prior.source {
            trail.push(format!("{}: {}", source, prior.detail));
        }
    }

    let mut connectivity = prior.clone();
    if let Some(file) = file {
        trail.push(file.describe());
        let outcome = fuse(&connectivity, file.evidence());
        if let Some(signal) = outcome.decided_by {
            trail.push(format!("logfile verdict: {:?}", signal));
        }
        connectivity = outcome.connectivity;
    }

    if let Some(probe) = probe {
        trail.push(probe.describe());
    }

    let verdict = if connectivity.has_verdict() {
        match (connectivity.connected, connectivity.warning.is_some()) {
            (true, false) => HealthVerdict::Connected,
            (true, true) => HealthVerdict::ConnectedWithWarning,
            (false, _) => HealthVerdict::Disconnected,
        }
    } else {
        match upstream {
            Some(UpstreamStatus::CredentialsValid { .. }) => HealthVerdict::CredentialsValidUnconfirmed,
            Some(UpstreamStatus::BotUnavailable(_)) => HealthVerdict::CredentialsValidBotUnavailable,
            Some(UpstreamStatus::CredentialsInvalid(_)) => HealthVerdict::CredentialsInvalid,
            _ => HealthVerdict::Unconfirmed,
        }
    };

    if let Some(upstream) = upstream {
        trail.push(format!("upstream check: {}", upstream.describe()));
    }
    trail.push(format!("verdict: {}", verdict.label()));

    if !connectivity.has_verdict() {
        connectivity.detail = verdict.label().to_string();
    }

    HealthAssessment {
        verdict,
        connectivity,
        trail,
    }
}

/// Point-in-time status gathered without a running supervisor.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub engine: Option<EngineLocation>,
    pub port: u16,
    pub port_in_use: bool,
    pub probe: ProbeResult,
    pub log_file: LogFileReading,
    pub upstream: Option<UpstreamStatus>,
    pub assessment: HealthAssessment,
}

pub async fn status_report(
    config: &Config,
    paths: &Paths,
    resolver: &Resolver,
    upstream: Option<&dyn CredentialCheck>,
) -> HealthReport {
    let mut engine = resolver.resolve(&config.engine.name);
    let token = read_token(config, paths);
    if let Some(location) = engine.as_mut() {
        let envs = engine_env(config, paths, resolver, Some(location), token.as_deref().unwrap_or(""));
        location.version = detect_version(location, &envs, config.timeouts.command()).await;
    }

    let port = config.engine.port;
    let port_in_use = is_port_in_use(port).await;
    let probe = HttpProbe::new(config.engine.health_url(), token).check().await;

    let classifier = Classifier::new(&config.classifier);
    let tail = LogFileTail::new(
        config.engine.log_dir(),
        config.engine.name.clone(),
        config.engine.log_tail_lines,
    );
    let log_file = tail.read(&classifier);

    let from_file = fuse(&Connectivity::default(), log_file.evidence()).connectivity;
    let upstream_status = match upstream {
        Some(check) if needs_upstream(&from_file) => Some(check.check().await),
        _ => None,
    };

    let assessment = assess(
        &Connectivity::default(),
        Some(&probe),
        Some(&log_file),
        upstream_status.as_ref(),
    );

    HealthReport {
        engine,
        port,
        port_in_use,
        probe,
        log_file,
        upstream: upstream_status,
        assessment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Evidence, EvidenceSource, Signal};
    use std::path::PathBuf;

    fn missing_file() -> LogFileReading {
        LogFileReading::Missing(PathBuf::from("/tmp/openclaw/openclaw-2026-01-01.log"))
    }

    #[test]
    fn test_valid_credentials_without_log_evidence_is_distinct() {
        let probe = ProbeResult::NotAlive("connection refused".to_string());
        let upstream = UpstreamStatus::CredentialsValid { bot_name: None };
        let a = assess(
            &Connectivity::default(),
            Some(&probe),
            Some(&missing_file()),
            Some(&upstream),
        );
        assert_eq!(a.verdict, HealthVerdict::CredentialsValidUnconfirmed);
        assert_ne!(a.verdict, HealthVerdict::Connected);
        assert_ne!(a.verdict, HealthVerdict::Disconnected);
        assert!(!a.connectivity.connected);

        let detail = a.detail();
        assert!(detail.contains("log file missing"));
        assert!(detail.contains("HTTP probe failed"));
        assert!(detail.contains("upstream check: credentials valid"));
    }

    #[test]
    fn test_stream_verdict_wins_over_upstream() {
        let prior = fuse(
            &Connectivity::default(),
            &[Evidence::new(EvidenceSource::StreamTap, Signal::Connected, "[feishu] ws client started")],
        )
        .connectivity;
        assert!(!needs_upstream(&prior));
        let a = assess(&prior, None, Some(&missing_file()), None);
        assert_eq!(a.verdict, HealthVerdict::Connected);
        assert!(a.detail().starts_with("stdout: connector connected"));
    }

    #[test]
    fn test_log_file_fatal_disconnects() {
        let reading = LogFileReading::Read {
            path: PathBuf::from("/tmp/x.log"),
            lines_scanned: 1,
            connector_lines: 1,
            evidence: vec![Evidence::new(
                EvidenceSource::LogFile,
                Signal::FatalError,
                "[feishu] extension missing",
            )],
        };
        let a = assess(&Connectivity::default(), None, Some(&reading), None);
        assert_eq!(a.verdict, HealthVerdict::Disconnected);
        assert_eq!(a.connectivity.detail, "[feishu] extension missing");
    }

    #[test]
    fn test_invalid_credentials() {
        let upstream = UpstreamStatus::CredentialsInvalid("app secret invalid".to_string());
        let a = assess(&Connectivity::default(), None, None, Some(&upstream));
        assert_eq!(a.verdict, HealthVerdict::CredentialsInvalid);
    }

    #[test]
    fn test_bot_unavailable_is_not_invalid_credentials() {
        let upstream = UpstreamStatus::BotUnavailable("Feishu bot info error 99991663".to_string());
        let a = assess(&Connectivity::default(), None, Some(&missing_file()), Some(&upstream));
        assert_eq!(a.verdict, HealthVerdict::CredentialsValidBotUnavailable);
        assert!(!a.connectivity.connected);
        assert!(a.detail().contains("upstream check: credentials valid, bot unavailable"));
        assert!(a.detail().ends_with("verdict: credentials valid, bot unavailable"));
    }

    #[test]
    fn test_nothing_known_is_unconfirmed_not_disconnected() {
        let a = assess(&Connectivity::default(), None, Some(&missing_file()), None);
        assert_eq!(a.verdict, HealthVerdict::Unconfirmed);
    }
}
