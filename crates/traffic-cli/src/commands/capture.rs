//! Toggle capture per direction

use super::on_off;
use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use traffic_core::{Bound, CaptureSettings, TrafficConfig};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    Inbound,
    Outbound,
    Both,
}

impl CaptureTarget {
    fn bound(self) -> Option<Bound> {
        match self {
            Self::Inbound => Some(Bound::Inbound),
            Self::Outbound => Some(Bound::Outbound),
            Self::Both => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CaptureArgs {
    /// Start recording calls in a direction
    Enable {
        #[arg(value_enum)]
        target: CaptureTarget,
    },
    /// Stop recording calls in a direction
    Disable {
        #[arg(value_enum)]
        target: CaptureTarget,
    },
}

pub fn capture(config: &TrafficConfig, args: CaptureArgs) -> Result<()> {
    let (target, enable) = match args {
        CaptureArgs::Enable { target } => (target, true),
        CaptureArgs::Disable { target } => (target, false),
    };

    let path = config.settings_path();
    let mut settings = CaptureSettings::load(&path)?;
    settings.set_capture(target.bound(), enable);
    settings.save(&path)?;

    tracing::info!(path = %path.display(), ?target, enable, "Capture settings saved");
    println!("inbound  {}", on_off(settings.inbound));
    println!("outbound {}", on_off(settings.outbound));
    Ok(())
}
