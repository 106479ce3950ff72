//! Toggle live monitoring

use super::on_off;
use anyhow::Result;
use clap::Subcommand;
use traffic_core::{CaptureSettings, ExecutionContext, LiveRingBuffer, TrafficConfig};

#[derive(Subcommand, Debug)]
pub enum LiveArgs {
    /// Publish captured calls to the live buffer
    Enable,
    /// Stop publishing and empty the live buffer
    Disable,
}

pub fn live(config: &TrafficConfig, args: LiveArgs) -> Result<()> {
    let enable = matches!(args, LiveArgs::Enable);

    let path = config.settings_path();
    let mut settings = CaptureSettings::load(&path)?;
    settings.live = enable;
    settings.save(&path)?;

    if !enable {
        let buffer = LiveRingBuffer::from_config(config, ExecutionContext::Cli);
        if let Err(e) = buffer.clear() {
            tracing::warn!(error = %e, "Could not empty the live buffer");
        }
    }

    println!("live {}", on_off(settings.live));
    Ok(())
}
