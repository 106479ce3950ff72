//! Filters for historical statistics.

use crate::record::{AggregateRow, Bound, Verb};
use chrono::NaiveDate;

/// Query parameters for aggregate rows. Every set filter must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateQuery {
    /// First day, inclusive.
    pub from: Option<NaiveDate>,
    /// Last day, inclusive.
    pub to: Option<NaiveDate>,
    pub site_id: Option<u64>,
    pub bound: Option<Bound>,
    pub id: Option<String>,
    pub verb: Option<Verb>,
    pub authority: Option<String>,
    pub code: Option<u16>,
    /// Maximum number of rows, busiest first.
    pub limit: Option<usize>,
}

impl AggregateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn from(mut self, from: NaiveDate) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: NaiveDate) -> Self {
        self.to = Some(to);
        self
    }

    pub fn site(mut self, site_id: u64) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn bound(mut self, bound: Bound) -> Self {
        self.bound = Some(bound);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn verb(mut self, verb: Verb) -> Self {
        self.verb = Some(verb);
        self
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &AggregateRow) -> bool {
        let key = &row.key;

        if self.from.is_some_and(|from| key.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| key.date > to) {
            return false;
        }
        if self.site_id.is_some_and(|site| key.site_id != site) {
            return false;
        }
        if self.bound.is_some_and(|bound| key.bound != bound) {
            return false;
        }
        if self.verb.is_some_and(|verb| key.verb != verb) {
            return false;
        }
        if self.code.is_some_and(|code| key.code != code) {
            return false;
        }
        if let Some(ref id) = self.id {
            if &key.id != id {
                return false;
            }
        }
        if let Some(ref authority) = self.authority {
            if &key.authority != authority {
                return false;
            }
        }

        true
    }
}
