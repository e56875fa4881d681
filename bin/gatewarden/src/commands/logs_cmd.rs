use gatewarden_engine::logfile::LogFileTail;

use super::load_supervisor;

/// Show the tail of today's engine log file.
pub async fn show(lines: usize) -> anyhow::Result<()> {
    let (config, _paths, supervisor) = load_supervisor()?;
    let path = LogFileTail::new(
        config.engine.log_dir(),
        config.engine.name.clone(),
        config.engine.log_tail_lines,
    )
    .today_path();

    let tail = supervisor.engine_log_tail(lines);
    if tail.is_empty() {
        println!("(No log lines in {})", path.display());
        return Ok(());
    }

    println!("📋 Logs: {} (last {} lines)", path.display(), tail.len());
    println!();
    for line in tail {
        println!("{}", line);
    }
    Ok(())
}
