//! CLI argument parsing

use crate::commands::{self, CaptureArgs, CodesArgs, LiveArgs, StatsArgs, TailArgs};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use traffic_core::{Bound, TrafficConfig};

/// Control traffic capture and follow recent HTTP calls
#[derive(Parser, Debug)]
#[command(name = "traffic")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Data directory, overrides TRAFFIC_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enable or disable capture of a direction
    #[command(subcommand)]
    Capture(CaptureArgs),

    /// Enable or disable live monitoring
    #[command(subcommand)]
    Live(LiveArgs),

    /// Show capture switches and storage locations
    Status,

    /// List HTTP status codes or this tool's exit codes
    #[command(subcommand)]
    Codes(CodesArgs),

    /// Follow recent calls from the live buffer
    Tail(TailArgs),

    /// Show daily statistics
    Stats(StatsArgs),
}

/// Direction of a call, as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl From<Direction> for Bound {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Inbound => Bound::Inbound,
            Direction::Outbound => Bound::Outbound,
        }
    }
}

fn load_config(data_dir: Option<&Path>) -> anyhow::Result<TrafficConfig> {
    let mut config = TrafficConfig::from_env().context("loading configuration")?;
    if let Some(dir) = data_dir {
        config = config.with_data_dir(dir);
    }
    Ok(config)
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> anyhow::Result<()> {
        let Cli {
            data_dir, command, ..
        } = self;
        let config = || load_config(data_dir.as_deref());

        match command {
            Commands::Capture(args) => commands::capture(&config()?, args),
            Commands::Live(args) => commands::live(&config()?, args),
            Commands::Status => commands::status(&config()?),
            Commands::Codes(args) => commands::codes(&args),
            Commands::Tail(args) => commands::tail(&config()?, args).await,
            Commands::Stats(args) => commands::stats(&config()?, args).await,
        }
    }
}
