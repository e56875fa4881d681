//! Clearing the engine's well-known port before a start and after a stop.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(300);
const HELPER_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Polls until nothing accepts on `port` or `limit` elapses. Returns whether the
/// port was released.
pub async fn wait_for_port_release(port: u16, limit: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if !is_port_in_use(port).await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}

async fn helper_output(program: &str, args: &[&str]) -> Option<String> {
    let result = tokio::time::timeout(
        HELPER_TIMEOUT,
        Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await;
    match result {
        Ok(Ok(output)) => Some(String::from_utf8_lossy(&output.stdout).to_string()),
        Ok(Err(e)) => {
            debug!(program, error = %e, "Port helper unavailable");
            None
        }
        Err(_) => {
            debug!(program, "Port helper timed out");
            None
        }
    }
}

/// Pids listening on `port`, excluding this process.
pub async fn port_owners(port: u16) -> Vec<u32> {
    let own = std::process::id();

    #[cfg(unix)]
    let pids: Vec<u32> = {
        let spec = format!("tcp:{}", port);
        helper_output("lsof", &["-ti", &spec, "-sTCP:LISTEN"])
            .await
            .map(|out| parse_pid_lines(&out))
            .unwrap_or_default()
    };

    #[cfg(windows)]
    let pids: Vec<u32> = helper_output("netstat", &["-ano", "-p", "TCP"])
        .await
        .map(|out| parse_netstat_listeners(&out, port))
        .unwrap_or_default();

    pids.into_iter().filter(|p| *p != own && *p != 0).collect()
}

/// Force-terminates whatever holds `port`. Best effort; returns the pids signalled.
pub async fn kill_port_owner(port: u16) -> Vec<u32> {
    let pids = port_owners(port).await;
    for pid in &pids {
        info!(pid, port, "Killing process holding engine port");
        force_kill(*pid).await;
    }
    pids
}

#[cfg(unix)]
async fn force_kill(pid: u32) {
    let rc = unsafe { libc::kill(pid as i32, libc::SIGKILL) };
    if rc != 0 {
        warn!(pid, error = %std::io::Error::last_os_error(), "SIGKILL failed");
    }
}

#[cfg(windows)]
async fn force_kill(pid: u32) {
    let pid_arg = pid.to_string();
    if helper_output("taskkill", &["/F", "/T", "/PID", &pid_arg])
        .await
        .is_none()
    {
        warn!(pid, "taskkill failed");
    }
}

/// Removes the engine from the OS service manager so it is not respawned
/// behind the supervisor's back.
pub async fn deregister_service(label: &str) {
    #[cfg(target_os = "macos")]
    {
        let uid = unsafe { libc::getuid() };
        let target = format!("gui/{}/{}", uid, label);
        let _ = helper_output("launchctl", &["bootout", &target]).await;
        debug!(label, "launchctl bootout issued");
    }

    #[cfg(target_os = "linux")]
    {
        let _ = helper_output("systemctl", &["--user", "stop", label]).await;
        debug!(label, "systemctl --user stop issued");
    }

    #[cfg(windows)]
    {
        let _ = helper_output("schtasks", &["/End", "/TN", label]).await;
        debug!(label, "schtasks /End issued");
    }
}

fn parse_pid_lines(out: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = out
        .lines()
        .filter_map(|l| l.trim().parse::<u32>().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[cfg_attr(not(windows), allow(dead_code))]
fn parse_netstat_listeners(out: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{}", port);
    let mut pids: Vec<u32> = out
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 || !cols[3].eq_ignore_ascii_case("LISTENING") {
                return None;
            }
            if !cols[1].ends_with(&suffix) {
                return None;
            }
            cols[4].parse::<u32>().ok()
        })
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pid_lines() {
        assert_eq!(parse_pid_lines("123\n456\n123\n\nabc\n"), vec![123, 456]);
    }

    #[test]
    fn test_parse_netstat() {
        let out = "\
  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:18789          0.0.0.0:0              LISTENING       4242
  TCP    0.0.0.0:187890         0.0.0.0:0              LISTENING       1
  TCP    127.0.0.1:18789        127.0.0.1:5000         ESTABLISHED     777
";
        assert_eq!(parse_netstat_listeners(out, 18789), vec![4242]);
    }

    #[tokio::test]
    async fn test_port_in_use_and_release() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_in_use(port).await);
        assert!(!wait_for_port_release(port, Duration::from_millis(200), Duration::from_millis(50)).await);

        drop(listener);
        assert!(wait_for_port_release(port, Duration::from_secs(2), Duration::from_millis(50)).await);
    }
}
