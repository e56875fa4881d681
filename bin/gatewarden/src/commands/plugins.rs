use gatewarden_engine::PluginStatus;

use super::load_supervisor;

pub async fn list(as_json: bool) -> anyhow::Result<()> {
    let (_config, _paths, supervisor) = load_supervisor()?;
    let mut plugins = supervisor.list_plugins().await?;
    plugins.sort_by(|a, b| a.id.cmp(&b.id));

    if as_json {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    if plugins.is_empty() {
        println!("(No plugins reported)");
        return Ok(());
    }

    println!("{:<24} {:<10} {}", "ID", "STATUS", "NAME");
    for plugin in &plugins {
        let mark = match plugin.status {
            PluginStatus::Loaded => "✓",
            PluginStatus::Disabled => " ",
            PluginStatus::Error => "✗",
        };
        println!(
            "{:<24} {} {:<8} {}",
            plugin.id, mark, plugin.status, plugin.display_name
        );
        if !plugin.description.is_empty() {
            println!("{:<24}   {}", "", plugin.description);
        }
    }
    Ok(())
}

pub async fn toggle(id: &str, enabled: bool) -> anyhow::Result<()> {
    let (_config, _paths, supervisor) = load_supervisor()?;
    supervisor.toggle_plugin(id, enabled).await?;
    println!(
        "✅ {} {} (restart the engine to apply)",
        id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
