use gatewarden_engine::port::is_port_in_use;
use gatewarden_engine::resolver::detect_version;
use gatewarden_engine::Resolver;
use std::collections::HashMap;

use super::load_supervisor;

/// Run environment diagnostics, then the engine's own `doctor --fix`.
pub async fn run() -> anyhow::Result<()> {
    let (config, paths, supervisor) = load_supervisor()?;

    println!();
    println!("🩺 gatewarden doctor");
    println!("====================");
    println!();

    let mut ok_count = 0u32;
    let mut warn_count = 0u32;
    let mut err_count = 0u32;

    println!("📋 Configuration");
    if paths.config_file().exists() {
        print_ok("Config file exists", &paths.config_file().display().to_string());
        ok_count += 1;
    } else {
        print_warn("Config file not found", "defaults are in use");
        warn_count += 1;
    }
    if config.channels.feishu.is_configured() {
        print_ok("Feishu credentials configured", &config.channels.feishu.domain);
        ok_count += 1;
    } else {
        print_warn("Feishu credentials missing", "set channels.feishu.appId/appSecret");
        warn_count += 1;
    }
    println!();

    println!("⚙️  Engine");
    let resolver = Resolver::new(&paths);
    let engine = resolver.resolve(&config.engine.name);
    match &engine {
        Some(location) => {
            let version = detect_version(location, &HashMap::new(), config.timeouts.command()).await;
            print_ok(
                &format!("{} found ({:?})", config.engine.name, location.source),
                &format!(
                    "{} {}",
                    location.path.display(),
                    version.as_deref().unwrap_or("(version unknown)")
                ),
            );
            ok_count += 1;
        }
        None => {
            print_err(
                &format!("{} not found", config.engine.name),
                "run `gatewarden install`",
            );
            err_count += 1;
        }
    }

    match which::which("node") {
        Ok(node) => {
            print_ok("node available", &node.display().to_string());
            ok_count += 1;
        }
        Err(_) => {
            print_warn("node not on PATH", "bundled or conventional locations will be tried");
            warn_count += 1;
        }
    }

    if is_port_in_use(config.engine.port).await {
        print_warn(
            &format!("port {} in use", config.engine.port),
            "an engine may already be running; `gatewarden stop` clears it",
        );
        warn_count += 1;
    } else {
        print_ok(&format!("port {} free", config.engine.port), "");
        ok_count += 1;
    }
    println!();

    if engine.is_some() {
        println!("🔧 {} doctor --fix", config.engine.name);
        match supervisor.doctor().await {
            Ok(output) => {
                for line in output.lines().filter(|l| !l.trim().is_empty()) {
                    println!("  {}", line);
                }
                print_ok("engine self-check passed", "");
                ok_count += 1;
            }
            Err(e) => {
                print_err("engine self-check failed", &e.to_string());
                err_count += 1;
            }
        }
        println!();
    }

    println!(
        "Summary: {} ok, {} warnings, {} errors",
        ok_count, warn_count, err_count
    );
    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {} — {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ⚠️  {}", label);
    } else {
        println!("  ⚠️  {} — {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {} — {}", label, hint);
    }
}
