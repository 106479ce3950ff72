use super::on_off;
use anyhow::Result;
use console::style;
use traffic_core::{CaptureSettings, ExecutionContext, LiveRingBuffer, TrafficConfig};

pub fn status(config: &TrafficConfig) -> Result<()> {
    let settings = CaptureSettings::load(&config.settings_path())?;
    let buffer = LiveRingBuffer::from_config(config, ExecutionContext::Cli);

    println!("{}", style("Capture").bold());
    println!("  inbound   {}", on_off(settings.inbound));
    println!("  outbound  {}", on_off(settings.outbound));
    println!("  live      {}", on_off(settings.live));
    if !settings.exclusions.is_empty() {
        println!("{}", style("Exclusions").bold());
        for rule in &settings.exclusions {
            println!("  {:<10} {}", rule.field, style(&rule.pattern).dim());
        }
    }

    println!("{}", style("Storage").bold());
    println!("  data dir  {}", config.data_dir.display());
    println!("  database  {}", config.database_url());
    match buffer.len() {
        Ok(len) => println!("  live      {}/{} entries", len, buffer.capacity()),
        Err(e) => println!("  live      {}", style(format!("unavailable ({})", e)).yellow()),
    }
    Ok(())
}
