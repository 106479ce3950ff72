//! Single-line rendering of tail entries and statistics rows.
//!
//! Widths are measured in terminal columns, so multibyte hosts and paths
//! line up. Control characters are removed before layout.

use crate::live::LiveEntry;
use crate::record::{AggregateRow, Bound};
use console::{measure_text_width, pad_str, Alignment};

pub const MIN_WIDTH: usize = 80;
pub const MAX_WIDTH: usize = 400;

const ELLIPSIS: &str = "…";

/// A rendered line plus the direction, for styling by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedLine {
    pub bound: Bound,
    pub text: String,
}

/// Clamp a requested line width to the supported range.
pub fn clamp_width(width: usize) -> usize {
    width.clamp(MIN_WIDTH, MAX_WIDTH)
}

pub fn strip_control(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

fn cell(value: &str, width: usize, align: Alignment) -> String {
    pad_str(&strip_control(value), width, align, Some(ELLIPSIS)).into_owned()
}

fn fit(line: &str, max_width: usize) -> String {
    pad_str(line, max_width, Alignment::Left, Some(ELLIPSIS))
        .trim_end()
        .to_string()
}

fn direction_label(bound: Bound) -> &'static str {
    match bound {
        Bound::Inbound => "IN",
        Bound::Outbound => "OUT",
        Bound::Unknown => "?",
    }
}

fn code_label(code: u16) -> String {
    if code == 0 {
        "-".to_string()
    } else {
        code.to_string()
    }
}

/// Render `YYYYMMDDHHmmssuuuuuu` as `YYYY-MM-DD HH:MM:SS.mmm`.
fn key_time(entry: &LiveEntry) -> String {
    match entry.key.to_datetime() {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => strip_control(entry.key.as_str()),
    }
}

/// Render one tail entry, at most `max_width` columns wide.
pub fn format_line(entry: &LiveEntry, max_width: usize) -> FormattedLine {
    let record = &entry.record;
    let target = format!(
        "{}://{}{}",
        record.scheme.as_str(),
        record.authority,
        record.endpoint
    );

    let line = [
        key_time(entry),
        cell(direction_label(record.bound), 3, Alignment::Left),
        cell(&record.verb.as_str().to_ascii_uppercase(), 7, Alignment::Left),
        cell(&code_label(record.code), 3, Alignment::Right),
        cell(&format!("{}ms", record.latency), 8, Alignment::Right),
        cell(&record.id, 24, Alignment::Left),
        strip_control(&target),
    ]
    .join(" ");

    FormattedLine {
        bound: record.bound,
        text: fit(&line, max_width),
    }
}

pub fn format_lines(entries: &[LiveEntry], max_width: usize) -> Vec<FormattedLine> {
    entries
        .iter()
        .map(|entry| format_line(entry, max_width))
        .collect()
}

/// Render one statistics row, at most `max_width` columns wide.
pub fn format_row(row: &AggregateRow, max_width: usize) -> FormattedLine {
    let key = &row.key;
    let line = [
        key.date.format("%Y-%m-%d").to_string(),
        cell(direction_label(key.bound), 3, Alignment::Left),
        cell(&key.verb.as_str().to_ascii_uppercase(), 7, Alignment::Left),
        cell(&code_label(key.code), 3, Alignment::Right),
        cell(&row.hit.to_string(), 7, Alignment::Right),
        cell(
            &format!(
                "{}/{:.0}/{}ms",
                row.latency_min, row.latency_avg, row.latency_max
            ),
            18,
            Alignment::Right,
        ),
        cell(row.country.as_deref().unwrap_or("-"), 2, Alignment::Left),
        strip_control(&format!("{}{}", key.authority, key.endpoint)),
    ]
    .join(" ");

    FormattedLine {
        bound: key.bound,
        text: fit(&line, max_width),
    }
}

/// Column titles matching [`format_row`].
pub fn row_header() -> String {
    [
        cell("day", 10, Alignment::Left),
        cell("dir", 3, Alignment::Left),
        cell("verb", 7, Alignment::Left),
        cell("sts", 3, Alignment::Right),
        cell("hits", 7, Alignment::Right),
        cell("min/avg/max", 18, Alignment::Right),
        cell("cc", 2, Alignment::Left),
        "target".to_string(),
    ]
    .join(" ")
}

/// Width actually used by `text`, in terminal columns.
pub fn display_width(text: &str) -> usize {
    measure_text_width(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::LiveKey;
    use crate::record::{EventRecord, Scheme, Verb};

    fn entry(authority: &str, endpoint: &str) -> LiveEntry {
        LiveEntry {
            key: LiveKey::parse("20240101120000123456").unwrap(),
            record: EventRecord::new(Bound::Outbound)
                .with_id("example.com")
                .with_verb(Verb::Post)
                .with_scheme(Scheme::Https)
                .with_authority(authority)
                .with_endpoint(endpoint)
                .with_code(201)
                .with_latency(42),
        }
    }

    #[test]
    fn renders_fields_in_order() {
        let line = format_line(&entry("api.example.com", "/v1/orders"), 200);
        assert_eq!(line.bound, Bound::Outbound);
        assert!(line.text.starts_with("2024-01-01 12:00:00.123 OUT POST    201     42ms example.com"));
        assert!(line.text.ends_with("https://api.example.com/v1/orders"));
    }

    #[test]
    fn long_lines_are_truncated_with_ellipsis() {
        let endpoint = format!("/{}", "segment/".repeat(40));
        let line = format_line(&entry("api.example.com", &endpoint), 80);
        assert!(display_width(&line.text) <= 80);
        assert!(line.text.ends_with(ELLIPSIS));
    }

    #[test]
    fn multibyte_text_is_measured_in_columns() {
        let line = format_line(&entry("例え.テスト", &"/ページ".repeat(30)), 90);
        assert!(display_width(&line.text) <= 90);
    }

    #[test]
    fn control_characters_are_removed() {
        let line = format_line(&entry("api.example.com", "/a\u{1b}[31m\nb"), 200);
        assert!(!line.text.chars().any(char::is_control));
        assert!(line.text.ends_with("/a[31mb"));
    }

    #[test]
    fn header_lines_up_with_rows() {
        let row = AggregateRow::first(&entry("api.example.com", "/").record);
        let line = format_row(&row, 200);
        let header = row_header();
        assert_eq!(header.find("target"), line.text.find("api.example.com"));
    }

    #[test]
    fn width_is_clamped() {
        assert_eq!(clamp_width(10), 80);
        assert_eq!(clamp_width(120), 120);
        assert_eq!(clamp_width(10_000), 400);
    }
}
