//! Field filters for tail views.
//!
//! `bound` is matched exactly, ignoring case. Every other field is matched
//! with a regular expression. All conditions must hold.

use crate::error::{Result, TrafficError};
use crate::live::{LiveEntry, LiveRingBuffer, TailBatch};
use crate::record::{Bound, EventRecord, Field};
use regex::Regex;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => value.eq_ignore_ascii_case(expected),
            Self::Pattern(re) => re.is_match(value),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TailFilter {
    conditions: Vec<(Field, Matcher)>,
}

impl TailFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only one direction.
    pub fn direction(self, bound: Bound) -> Self {
        self.exact(Field::Bound, bound.as_str())
    }

    fn exact(mut self, field: Field, value: &str) -> Self {
        self.conditions
            .push((field, Matcher::Exact(value.trim().to_string())));
        self
    }

    /// Add a condition on `field`. `bound` takes a direction name, every
    /// other field a regular expression.
    pub fn field(self, field: Field, pattern: &str) -> Result<Self> {
        if field == Field::Bound {
            return Ok(self.exact(field, pattern));
        }
        let mut this = self;
        this.conditions
            .push((field, Matcher::Pattern(Regex::new(pattern)?)));
        Ok(this)
    }

    /// Parse a JSON object of `field: pattern` pairs, e.g.
    /// `{"bound": "inbound", "authority": "\\.example\\.com$"}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let pairs: BTreeMap<String, String> = serde_json::from_str(raw)
            .map_err(|e| TrafficError::InvalidFilter(format!("expected a JSON object of strings: {}", e)))?;

        pairs.iter().try_fold(Self::new(), |filter, (name, pattern)| {
            let field = name.parse::<Field>().map_err(TrafficError::InvalidFilter)?;
            filter.field(field, pattern)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        self.conditions
            .iter()
            .all(|(field, matcher)| matcher.matches(&field.value(record)))
    }
}

/// Read the live buffer past `since`, narrowed to one direction and a field
/// filter.
///
/// The returned index covers every entry newer than `since`, including
/// ones the filters hid, so the next poll never sees them again.
pub fn tail_read(
    live: &LiveRingBuffer,
    since: &str,
    direction: Option<Bound>,
    tail_filter: Option<&TailFilter>,
) -> TailBatch {
    let batch = live.read(since);

    let mut tail = tail_filter.cloned().unwrap_or_default();
    if let Some(bound) = direction {
        tail = tail.direction(bound);
    }
    if tail.is_empty() {
        return batch;
    }

    TailBatch {
        items: filter(batch.items, &tail, None),
        index: batch.index,
    }
}

/// Entries matching `filter` with a key greater than `since`, ascending by key.
pub fn filter(entries: Vec<LiveEntry>, filter: &TailFilter, since: Option<&str>) -> Vec<LiveEntry> {
    let mut kept: Vec<LiveEntry> = entries
        .into_iter()
        .filter(|entry| since.map_or(true, |since| entry.key.as_str() > since))
        .filter(|entry| filter.matches(&entry.record))
        .collect();
    kept.sort_by(|a, b| a.key.cmp(&b.key));
    kept
}
