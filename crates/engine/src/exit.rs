use std::io;
use std::path::Path;

/// How the engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    /// Non-zero exit code. A signal-terminated process has no code and counts as clean.
    pub fn is_failure(&self) -> bool {
        matches!(self.code, Some(code) if code != 0)
    }
}

fn exit_code_hint(code: i32) -> Option<&'static str> {
    match code {
        1 => Some("general error"),
        2 => Some("invalid command-line usage"),
        126 => Some("permission denied: the engine script is not executable"),
        127 => Some("command not found: the engine or its runtime (node) is missing from PATH"),
        130 => Some("interrupted"),
        134 => Some("aborted (crash)"),
        137 => Some("killed (possibly out of memory)"),
        139 => Some("segmentation fault"),
        143 => Some("terminated"),
        _ => None,
    }
}

/// Human-readable reason for an unexpected exit, with the stderr tail appended.
pub fn describe_exit(info: &ExitInfo, stderr_tail: &[String]) -> String {
    let mut msg = match (info.code, info.signal) {
        (Some(code), _) => match exit_code_hint(code) {
            Some(hint) => format!("engine exited with code {} ({})", code, hint),
            None => format!("engine exited with code {}", code),
        },
        (None, Some(sig)) => format!("engine terminated by signal {}", sig),
        (None, None) => "engine exited".to_string(),
    };
    let tail: Vec<&str> = stderr_tail
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if !tail.is_empty() {
        msg.push_str("; stderr: ");
        msg.push_str(&tail.join("\n"));
    }
    msg
}

/// Actionable message for an OS-level spawn failure.
pub fn describe_spawn_error(err: &io::Error, path: &Path) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => format!(
            "{} does not exist or its interpreter is missing; reinstall the engine",
            path.display()
        ),
        io::ErrorKind::PermissionDenied => format!(
            "permission denied executing {}; run `chmod +x {}`",
            path.display(),
            path.display()
        ),
        _ => format!("{}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_127_mentions_command_not_found_and_stderr() {
        let info = ExitInfo {
            code: Some(127),
            signal: None,
        };
        let msg = describe_exit(&info, &["env: node: No such file or directory".to_string()]);
        assert!(msg.contains("command not found"));
        assert!(msg.contains("env: node: No such file or directory"));
        assert!(info.is_failure());
    }

    #[test]
    fn test_signal_exit_is_not_failure() {
        let info = ExitInfo {
            code: None,
            signal: Some(15),
        };
        assert!(!info.is_failure());
        assert_eq!(describe_exit(&info, &[]), "engine terminated by signal 15");
    }

    #[test]
    fn test_unknown_code() {
        let info = ExitInfo {
            code: Some(42),
            signal: None,
        };
        assert_eq!(describe_exit(&info, &[]), "engine exited with code 42");
    }

    #[test]
    fn test_spawn_error_messages() {
        let path = Path::new("/opt/engine/bin/openclaw");
        let not_found = io::Error::from(io::ErrorKind::NotFound);
        assert!(describe_spawn_error(&not_found, path).contains("/opt/engine/bin/openclaw"));
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(describe_spawn_error(&denied, path).contains("chmod +x"));
    }
}
