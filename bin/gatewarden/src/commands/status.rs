use gatewarden_channels::CredentialCheck;
use gatewarden_engine::probe::ProbeResult;
use gatewarden_engine::{status_report, Resolver};
use serde_json::json;
use std::sync::Arc;

use super::load_supervisor;

pub async fn run(as_json: bool) -> anyhow::Result<()> {
    let (config, paths, _supervisor) = load_supervisor()?;
    let resolver = Resolver::new(&paths);

    let upstream: Option<Arc<dyn CredentialCheck>> = if config.channels.feishu.is_configured() {
        Some(Arc::new(gatewarden_channels::FeishuProbe::new(&config.channels.feishu)))
    } else {
        None
    };
    let report = status_report(&config, &paths, &resolver, upstream.as_deref()).await;

    if as_json {
        let value = json!({
            "engine": report.engine,
            "port": report.port,
            "portInUse": report.port_in_use,
            "alive": report.probe.is_alive(),
            "verdict": report.assessment.verdict,
            "connectivity": report.assessment.connectivity,
            "healthDetail": report.assessment.detail(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("gatewarden status");
    println!("=================");
    println!();
    println!("Config:    {}", paths.config_file().display());
    match &report.engine {
        Some(engine) => println!(
            "Engine:    {} ({:?}, {})",
            engine.path.display(),
            engine.source,
            engine.version.as_deref().unwrap_or("unknown version")
        ),
        None => println!("Engine:    ✗ not installed (run `gatewarden install`)"),
    }
    println!(
        "Port:      {} {}",
        report.port,
        if report.port_in_use { "in use" } else { "free" }
    );
    match &report.probe {
        ProbeResult::Alive { .. } => println!("Health:    ✓ {}", report.probe.describe()),
        ProbeResult::NotAlive(_) => println!("Health:    ✗ {}", report.probe.describe()),
    }
    println!("Feishu:    {}", if config.channels.feishu.is_configured() { "configured" } else { "not configured" });
    println!();
    println!("Verdict:   {}", report.assessment.verdict.label());
    for step in &report.assessment.trail {
        println!("  - {}", step);
    }
    Ok(())
}
