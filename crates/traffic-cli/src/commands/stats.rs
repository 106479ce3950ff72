//! Daily statistics

use super::styled;
use crate::cli::Direction;
use crate::error::CliError;
use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use console::style;
use traffic_core::format::{clamp_width, format_row, row_header};
use traffic_core::{AggregateQuery, AggregateStore, Bound, SqliteAggregateStore, TrafficConfig};

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// First day, YYYY-MM-DD
    #[arg(long)]
    pub from: Option<String>,

    /// Last day, YYYY-MM-DD
    #[arg(long)]
    pub to: Option<String>,

    #[arg(short, long, value_enum)]
    pub direction: Option<Direction>,

    /// Maximum number of rows, busiest first
    #[arg(short, long, default_value_t = 50)]
    pub limit: usize,

    /// Line width, clamped to 80-400
    #[arg(long, default_value_t = 160)]
    pub col: usize,
}

fn parse_day(flag: &str, value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("{} '{}': {}", flag, value, e)))
}

pub async fn stats(config: &TrafficConfig, args: StatsArgs) -> Result<()> {
    let mut query = AggregateQuery::new()
        .site(config.site_id)
        .limit(args.limit);
    if let Some(from) = &args.from {
        query = query.from(parse_day("--from", from)?);
    }
    if let Some(to) = &args.to {
        query = query.to(parse_day("--to", to)?);
    }
    if let Some(direction) = args.direction {
        query = query.bound(Bound::from(direction));
    }

    std::fs::create_dir_all(&config.data_dir)?;
    let store = SqliteAggregateStore::connect(&config.database_url(), &config.stats_table).await?;
    let rows = store.query(&query).await?;

    if rows.is_empty() {
        println!("{}", style("No statistics recorded").dim());
        return Ok(());
    }

    let width = clamp_width(args.col);
    println!("{}", style(row_header()).bold());
    for row in &rows {
        println!("{}", styled(&format_row(row, width)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_days() {
        assert!(parse_day("--from", "2024-02-30").is_err());
        assert!(parse_day("--from", "yesterday").is_err());
        assert_eq!(
            parse_day("--to", "2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }
}
