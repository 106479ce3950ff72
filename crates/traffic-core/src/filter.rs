//! Capture-time exclusion rules.
//!
//! A record matching any rule is dropped before it reaches the aggregator
//! or the live buffer. The usual use is suppressing the monitoring
//! endpoints themselves so tailing does not feed back into the tail.

use crate::error::Result;
use crate::record::{EventRecord, Field};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Persisted form of one denylist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub field: Field,
    pub pattern: String,
}

impl ExclusionRule {
    pub fn new(field: Field, pattern: impl Into<String>) -> Self {
        Self {
            field,
            pattern: pattern.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    rules: Vec<(Field, Regex)>,
}

impl ExclusionRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, failing on an invalid pattern.
    pub fn add(mut self, field: Field, pattern: &str) -> Result<Self> {
        self.rules.push((field, Regex::new(pattern)?));
        Ok(self)
    }

    /// Compile persisted rules. Invalid patterns are skipped.
    pub fn from_rules(rules: &[ExclusionRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(re) => Some((rule.field, re)),
                Err(e) => {
                    tracing::warn!(
                        field = %rule.field,
                        pattern = %rule.pattern,
                        error = %e,
                        "Ignoring invalid exclusion pattern"
                    );
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_excluded(&self, record: &EventRecord) -> bool {
        self.rules
            .iter()
            .any(|(field, re)| re.is_match(&field.value(record)))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Bound;

    #[test]
    fn any_matching_rule_excludes() {
        let rules = ExclusionRules::new()
            .add(Field::Endpoint, "^/traffic/tail")
            .unwrap()
            .add(Field::Id, r"^10\.")
            .unwrap();

        let tail = EventRecord::new(Bound::Inbound).with_endpoint("/traffic/tail/poll");
        let internal = EventRecord::new(Bound::Inbound).with_id("10.1.2.3");
        let regular = EventRecord::new(Bound::Inbound)
            .with_endpoint("/shop")
            .with_id("203.0.113.4");

        assert!(rules.is_excluded(&tail));
        assert!(rules.is_excluded(&internal));
        assert!(!rules.is_excluded(&regular));
    }

    #[test]
    fn invalid_persisted_patterns_are_skipped() {
        let rules = ExclusionRules::from_rules(&[
            ExclusionRule::new(Field::Authority, "("),
            ExclusionRule::new(Field::Authority, "^metrics\\."),
        ]);
        assert_eq!(rules.len(), 1);
        assert!(ExclusionRules::new().add(Field::Id, "(").is_err());
    }
}
