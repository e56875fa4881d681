use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::classify::{Classifier, Evidence, EvidenceSource, Signal};

/// `<dir>/<name>-YYYY-MM-DD.log`
pub fn daily_log_path(dir: &Path, name: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}-{}.log", name, date.format("%Y-%m-%d")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFileReading {
    Missing(PathBuf),
    Unreadable { path: PathBuf, reason: String },
    Read {
        path: PathBuf,
        lines_scanned: usize,
        connector_lines: usize,
        /// Evidence for every connector-related line in the tail, oldest first.
        evidence: Vec<Evidence>,
    },
}

impl LogFileReading {
    pub fn evidence(&self) -> &[Evidence] {
        match self {
            LogFileReading::Read { evidence, .. } => evidence,
            _ => &[],
        }
    }

    pub fn describe(&self) -> String {
        match self {
            LogFileReading::Missing(path) => format!("log file missing ({})", path.display()),
            LogFileReading::Unreadable { reason, .. } => format!("log file unreadable: {}", reason),
            LogFileReading::Read {
                lines_scanned,
                connector_lines,
                evidence,
                ..
            } => {
                let decisive = evidence.iter().filter(|e| e.signal != Signal::Unknown).count();
                format!(
                    "log file: {} lines scanned, {} connector lines, {} decisive",
                    lines_scanned, connector_lines, decisive
                )
            }
        }
    }
}

/// Reads the tail of the engine's own daily log.
#[derive(Debug, Clone)]
pub struct LogFileTail {
    dir: PathBuf,
    name: String,
    lines: usize,
}

impl LogFileTail {
    pub fn new(dir: PathBuf, name: impl Into<String>, lines: usize) -> Self {
        Self {
            dir,
            name: name.into(),
            lines: lines.max(1),
        }
    }

    pub fn today_path(&self) -> PathBuf {
        daily_log_path(&self.dir, &self.name, Local::now().date_naive())
    }

    /// Last `n` raw lines of today's file.
    pub fn tail(&self, n: usize) -> Vec<String> {
        match std::fs::read(self.today_path()) {
            Ok(bytes) => last_lines(&String::from_utf8_lossy(&bytes), n),
            Err(_) => Vec::new(),
        }
    }

    pub fn read(&self, classifier: &Classifier) -> LogFileReading {
        self.read_path(&self.today_path(), classifier)
    }

    /// Classifies every connector line in the tail, not only the last one, so a
    /// stale trailing error cannot hide a later recovery.
    pub fn read_path(&self, path: &Path, classifier: &Classifier) -> LogFileReading {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return LogFileReading::Missing(path.to_path_buf())
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Engine log file unreadable");
                return LogFileReading::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                };
            }
        };

        let lines = last_lines(&String::from_utf8_lossy(&bytes), self.lines);
        let evidence: Vec<Evidence> = lines
            .iter()
            .filter(|l| classifier.is_connector_line(l))
            .map(|l| classifier.evidence(EvidenceSource::LogFile, l))
            .collect();

        LogFileReading::Read {
            path: path.to_path_buf(),
            lines_scanned: lines.len(),
            connector_lines: evidence.len(),
            evidence,
        }
    }
}

fn last_lines(text: &str, n: usize) -> Vec<String> {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(n)..]
        .iter()
        .map(|l| l.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{fuse, Connectivity};

    #[test]
    fn test_daily_path_format() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(
            daily_log_path(Path::new("/tmp/openclaw"), "openclaw", date),
            PathBuf::from("/tmp/openclaw/openclaw-2026-03-07.log")
        );
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let tail = LogFileTail::new(tmp.path().to_path_buf(), "openclaw", 100);
        let reading = tail.read(&Classifier::default());
        assert!(matches!(reading, LogFileReading::Missing(_)));
        assert!(reading.describe().starts_with("log file missing"));
        assert!(reading.evidence().is_empty());
    }

    #[test]
    fn test_tail_limit_and_connector_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let tail = LogFileTail::new(tmp.path().to_path_buf(), "openclaw", 3);
        let content = "\
[feishu] channel stopped
[gateway] heartbeat
[feishu] ws client started
[gateway] heartbeat
[feishu] message received from ou_1
";
        std::fs::write(tail.today_path(), content).unwrap();
        let reading = tail.read(&Classifier::default());
        match &reading {
            LogFileReading::Read {
                lines_scanned,
                connector_lines,
                evidence,
                ..
            } => {
                assert_eq!(*lines_scanned, 3);
                assert_eq!(*connector_lines, 2);
                assert_eq!(evidence[0].signal, Signal::Connected);
                assert_eq!(evidence[1].signal, Signal::Active);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tail.tail(2).len(), 2);
    }

    #[test]
    fn test_trailing_error_does_not_hide_activity() {
        let tmp = tempfile::tempdir().unwrap();
        let tail = LogFileTail::new(tmp.path().to_path_buf(), "openclaw", 100);
        let content = "\
[feishu] message received from ou_1
[feishu] websocket disconnected, retrying
";
        std::fs::write(tail.today_path(), content).unwrap();
        let reading = tail.read(&Classifier::default());
        let outcome = fuse(&Connectivity::default(), reading.evidence());
        assert!(outcome.connectivity.connected);
    }

    #[test]
    fn test_stop_after_start_reads_as_disconnected() {
        let tmp = tempfile::tempdir().unwrap();
        let tail = LogFileTail::new(tmp.path().to_path_buf(), "openclaw", 100);
        let content = "\
[feishu] ws client started
[gateway] heartbeat
[feishu] channel stopped
";
        std::fs::write(tail.today_path(), content).unwrap();
        let reading = tail.read(&Classifier::default());
        let outcome = fuse(&Connectivity::default(), reading.evidence());
        assert!(!outcome.connectivity.connected);
        assert_eq!(outcome.connectivity.detail, "[feishu] channel stopped");
    }
}
