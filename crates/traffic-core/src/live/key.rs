use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// `YYYYMMDDHHmmssuuuuuu`
pub const KEY_FORMAT: &str = "%Y%m%d%H%M%S%6f";

const KEY_LEN: usize = 20;

/// Sortable live-buffer key.
///
/// Fixed-width microsecond timestamps, so string order is chronological
/// order across every writer. Deserializing rejects malformed keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct LiveKey(String);

impl LiveKey {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(KEY_FORMAT).to_string())
    }

    /// Accept only well-formed keys.
    pub fn parse(raw: &str) -> Option<Self> {
        parse_key(raw).map(|_| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        parse_key(&self.0)
    }

    /// The key one microsecond later.
    ///
    /// A malformed key has no successor and restarts from the current time.
    pub fn successor(&self) -> Self {
        match self
            .to_datetime()
            .and_then(|at| at.checked_add_signed(TimeDelta::microseconds(1)))
        {
            Some(next) => Self(next.format(KEY_FORMAT).to_string()),
            None => Self::now(),
        }
    }
}

impl fmt::Display for LiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LiveKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| de::Error::custom(format!("malformed live key '{}'", raw)))
    }
}

impl AsRef<str> for LiveKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn parse_key(raw: &str) -> Option<NaiveDateTime> {
    if raw.len() != KEY_LEN || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let num = |from: usize, to: usize| raw[from..to].parse::<u32>().ok();

    NaiveDate::from_ymd_opt(num(0, 4)? as i32, num(4, 6)?, num(6, 8)?)?.and_hms_micro_opt(
        num(8, 10)?,
        num(10, 12)?,
        num(12, 14)?,
        num(14, 20)?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_fixed_width_microseconds() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + TimeDelta::microseconds(1);
        assert_eq!(LiveKey::from_datetime(at).as_str(), "20240101120000000001");
    }

    #[test]
    fn successor_rolls_over_second_boundary() {
        let key = LiveKey::parse("20241231235959999999").unwrap();
        assert_eq!(key.successor().as_str(), "20250101000000000000");
        assert!(key.successor() > key);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(LiveKey::parse("0").is_none());
        assert!(LiveKey::parse("2024010112000000000a").is_none());
        assert!(LiveKey::parse("20241301120000000000").is_none());
    }

    #[test]
    fn deserialize_rejects_malformed_keys() {
        let key: LiveKey = serde_json::from_str("\"20240101120000000001\"").unwrap();
        assert_eq!(key.as_str(), "20240101120000000001");
        assert!(serde_json::from_str::<LiveKey>("\"abc\"").is_err());
        assert!(serde_json::from_str::<LiveKey>("\"99999999999999999999\"").is_err());
    }
}
