use gatewarden_engine::port::is_port_in_use;
use gatewarden_engine::{Lifecycle, LogStream, SupervisorState};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use super::load_supervisor;

fn describe_state(state: &SupervisorState) -> String {
    let mut line = format!("{:?}", state.lifecycle).to_lowercase();
    if let Some(pid) = state.pid {
        line.push_str(&format!(" (pid {})", pid));
    }
    let conn = &state.connectivity;
    line.push_str(if conn.connected { " | connected" } else { " | not connected" });
    if !conn.detail.is_empty() {
        line.push_str(&format!(": {}", conn.detail));
    }
    if let Some(warning) = &conn.warning {
        line.push_str(&format!(" (warning: {})", warning));
    }
    line
}

/// Foreground supervision until Ctrl-C or the engine dies.
pub async fn run(follow: bool) -> anyhow::Result<()> {
    let (config, _paths, supervisor) = load_supervisor()?;
    let mut states = supervisor.subscribe();
    let mut logs = supervisor.subscribe_logs();

    println!(
        "Starting {} on port {}...",
        config.engine.name, config.engine.port
    );
    if let Err(e) = supervisor.start().await {
        eprintln!("❌ {}", e);
        let recent = supervisor.logs();
        for entry in recent.iter().skip(recent.len().saturating_sub(10)) {
            eprintln!("   {}", entry.line);
        }
        supervisor.dispose().await;
        return Err(e.into());
    }

    let state = supervisor.state();
    println!("✅ {}", describe_state(&state));
    println!("Press Ctrl-C to stop.");

    let mut last = describe_state(&state);
    let mut failure: Option<String> = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, stopping engine");
                break;
            }
            changed = states.recv() => match changed {
                Ok(state) => {
                    let line = describe_state(&state);
                    if line != last {
                        println!("• {}", line);
                        last = line;
                    }
                    match state.lifecycle {
                        Lifecycle::Error => {
                            failure = state.last_error.clone();
                            break;
                        }
                        Lifecycle::Stopped => break,
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            entry = logs.recv(), if follow => match entry {
                Ok(entry) => {
                    let tag = match entry.stream {
                        LogStream::Stdout => "out",
                        LogStream::Stderr => "err",
                        LogStream::Supervisor => "sup",
                    };
                    println!("[{}] {}", tag, entry.line);
                }
                Err(RecvError::Lagged(n)) => println!("[sup] ... {} lines skipped", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    supervisor.dispose().await;
    match failure {
        Some(reason) => anyhow::bail!("engine stopped with an error: {}", reason),
        None => {
            println!("Engine stopped.");
            Ok(())
        }
    }
}

pub async fn stop() -> anyhow::Result<()> {
    let (config, _paths, supervisor) = load_supervisor()?;
    if !is_port_in_use(config.engine.port).await {
        println!("Nothing is listening on port {}.", config.engine.port);
        return Ok(());
    }
    supervisor.stop().await?;
    if is_port_in_use(config.engine.port).await {
        anyhow::bail!("port {} is still in use after stopping", config.engine.port);
    }
    println!("✅ Engine stopped.");
    Ok(())
}
