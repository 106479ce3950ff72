//! Follow the live buffer

use super::styled;
use crate::cli::Direction;
use crate::error::CliError;
use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::sync::Arc;
use std::time::Duration;
use traffic_core::format::{clamp_width, format_line};
use traffic_core::query::tail_read;
use traffic_core::{
    Bound, CaptureSettings, ExecutionContext, LiveRingBuffer, TailFilter, TrafficConfig,
};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Args, Debug)]
pub struct TailArgs {
    /// Only show one direction
    #[arg(short, long, value_enum)]
    pub direction: Option<Direction>,

    /// JSON object of field/regex pairs, e.g. '{"authority": "example\\.com$"}'
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Line width, clamped to 80-400
    #[arg(long, default_value_t = 160)]
    pub col: usize,

    /// Print what is buffered and exit
    #[arg(long)]
    pub once: bool,
}

pub async fn tail(config: &TrafficConfig, args: TailArgs) -> Result<()> {
    let filter = match &args.filter {
        Some(raw) => Some(
            TailFilter::from_json(raw)
                .map_err(|e| CliError::InvalidArgument(format!("--filter: {}", e)))?,
        ),
        None => None,
    };
    let direction = args.direction.map(Bound::from);
    let width = clamp_width(args.col);

    let settings = CaptureSettings::load(&config.settings_path())?;
    if !settings.live {
        eprintln!(
            "{} live monitoring is off, enable it with `traffic live enable`",
            style("note:").yellow().bold()
        );
    }

    let buffer = Arc::new(LiveRingBuffer::from_config(config, ExecutionContext::Cli));
    let filter = Arc::new(filter);
    let mut since = "0".to_string();

    loop {
        let batch = {
            let buffer = buffer.clone();
            let filter = filter.clone();
            let since = since.clone();
            tokio::task::spawn_blocking(move || {
                tail_read(&buffer, &since, direction, (*filter).as_ref())
            })
            .await
            .context("reading the live buffer")?
        };

        for entry in &batch.items {
            println!("{}", styled(&format_line(entry, width)));
        }
        since = batch.index;

        if args.once {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}
