use gatewarden_engine::{InstallPhase, InstallProgress};
use tokio::sync::mpsc;

use super::load_supervisor;

fn render(progress: &InstallProgress) {
    let icon = match progress.phase {
        InstallPhase::Checking => "🔎",
        InstallPhase::Downloading => "⬇️ ",
        InstallPhase::Installing => "📦",
        InstallPhase::Done => "✅",
        InstallPhase::Error => "❌",
    };
    match progress.percent {
        Some(p) => println!("{} [{:>3}%] {}", icon, p, progress.message),
        None => println!("{} {}", icon, progress.message),
    }
}

pub async fn run() -> anyhow::Result<()> {
    let (config, _paths, supervisor) = load_supervisor()?;
    println!("Installing {} ({})", config.engine.name, config.engine.npm_package);

    let (tx, mut rx) = mpsc::channel::<InstallProgress>(64);
    let printer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            render(&progress);
        }
    });

    let result = supervisor.install(tx).await;
    let _ = printer.await;

    let location = result?;
    if let Some(version) = &location.version {
        println!("Version: {}", version);
    }
    Ok(())
}
