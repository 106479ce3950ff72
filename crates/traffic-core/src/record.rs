//! Data structures for captured traffic.
//!
//! [`EventRecord`] is one observed HTTP transaction. [`AggregateRow`] is the
//! durable per-day rollup it is merged into, identified by [`AggregateKey`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Direction of a call relative to the monitored site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    Inbound,
    Outbound,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Bound {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored or user-supplied value, mapping anything unrecognized to `Unknown`.
    pub fn parse_lossy(value: &str) -> Self {
        value.parse().unwrap_or(Self::Unknown)
    }
}

impl FromStr for Bound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown bound '{}'", other)),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Lowercased HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Head => "head",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Connect => "connect",
            Self::Options => "options",
            Self::Trace => "trace",
            Self::Patch => "patch",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "get" => Self::Get,
            "head" => Self::Head,
            "post" => Self::Post,
            "put" => Self::Put,
            "delete" => Self::Delete,
            "connect" => Self::Connect,
            "options" => Self::Options,
            "trace" => Self::Trace,
            "patch" => Self::Patch,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Self::Http,
            "https" => Self::Https,
            _ => Self::Unknown,
        }
    }

    /// Port implied by the scheme when none is given.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Http => Some(80),
            Self::Https => Some(443),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One observed HTTP transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// When the call completed
    pub timestamp: DateTime<Utc>,

    /// Tenant identifier, 0 when single-tenant
    #[serde(default)]
    pub site_id: u64,

    #[serde(default)]
    pub bound: Bound,

    /// Registrable domain for outbound calls, client IP for inbound calls
    pub id: String,

    #[serde(default)]
    pub verb: Verb,

    #[serde(default)]
    pub scheme: Scheme,

    /// `host[:port]`, possibly prefixed by `user:pass@`
    pub authority: String,

    /// URL path only
    pub endpoint: String,

    /// HTTP status, 0 when unknown
    #[serde(default)]
    pub code: u16,

    /// Response size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Duration in milliseconds
    #[serde(default)]
    pub latency: u64,

    /// ISO-3166 alpha-2 country code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl EventRecord {
    /// Create a record with sentinel values everywhere but the direction.
    pub fn new(bound: Bound) -> Self {
        Self {
            timestamp: Utc::now(),
            site_id: 0,
            bound,
            id: "-".to_string(),
            verb: Verb::Unknown,
            scheme: Scheme::Unknown,
            authority: "-".to_string(),
            endpoint: "-".to_string(),
            code: 0,
            size: None,
            latency: 0,
            country: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_site(mut self, site_id: u64) -> Self {
        self.site_id = site_id;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_verb(mut self, verb: Verb) -> Self {
        self.verb = verb;
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_latency(mut self, latency: u64) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country;
        self
    }

    /// Composite key this record merges into.
    pub fn aggregate_key(&self) -> AggregateKey {
        AggregateKey {
            date: self.timestamp.date_naive(),
            site_id: self.site_id,
            bound: self.bound,
            id: self.id.clone(),
            verb: self.verb,
            scheme: self.scheme,
            authority: self.authority.clone(),
            endpoint: self.endpoint.clone(),
            code: self.code,
        }
    }
}

/// Record field addressable by filters and exclusion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Site,
    Bound,
    Id,
    Verb,
    Scheme,
    Authority,
    Endpoint,
    Code,
    Size,
    Latency,
    Country,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Bound => "bound",
            Self::Id => "id",
            Self::Verb => "verb",
            Self::Scheme => "scheme",
            Self::Authority => "authority",
            Self::Endpoint => "endpoint",
            Self::Code => "code",
            Self::Size => "size",
            Self::Latency => "latency",
            Self::Country => "country",
        }
    }

    /// Render this field of `record` as text for pattern matching.
    pub fn value<'a>(&self, record: &'a EventRecord) -> Cow<'a, str> {
        match self {
            Self::Site => Cow::Owned(record.site_id.to_string()),
            Self::Bound => Cow::Borrowed(record.bound.as_str()),
            Self::Id => Cow::Borrowed(record.id.as_str()),
            Self::Verb => Cow::Borrowed(record.verb.as_str()),
            Self::Scheme => Cow::Borrowed(record.scheme.as_str()),
            Self::Authority => Cow::Borrowed(record.authority.as_str()),
            Self::Endpoint => Cow::Borrowed(record.endpoint.as_str()),
            Self::Code => Cow::Owned(record.code.to_string()),
            Self::Size => Cow::Owned(record.size.map(|s| s.to_string()).unwrap_or_default()),
            Self::Latency => Cow::Owned(record.latency.to_string()),
            Self::Country => Cow::Borrowed(record.country.as_deref().unwrap_or("")),
        }
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "site" | "site_id" => Ok(Self::Site),
            "bound" | "context" | "direction" => Ok(Self::Bound),
            "id" => Ok(Self::Id),
            "verb" | "method" => Ok(Self::Verb),
            "scheme" => Ok(Self::Scheme),
            "authority" | "host" => Ok(Self::Authority),
            "endpoint" | "path" => Ok(Self::Endpoint),
            "code" | "status" => Ok(Self::Code),
            "size" => Ok(Self::Size),
            "latency" => Ok(Self::Latency),
            "country" => Ok(Self::Country),
            other => Err(format!("unknown field '{}'", other)),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Merge key of the durable statistics table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateKey {
    pub date: NaiveDate,
    pub site_id: u64,
    pub bound: Bound,
    pub id: String,
    pub verb: Verb,
    pub scheme: Scheme,
    pub authority: String,
    pub endpoint: String,
    pub code: u16,
}

/// Durable per-day statistics for one [`AggregateKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    #[serde(flatten)]
    pub key: AggregateKey,
    pub country: Option<String>,
    pub hit: u64,
    pub latency_min: u64,
    /// Running mean, updated one sample at a time
    pub latency_avg: f64,
    pub latency_max: u64,
}

impl AggregateRow {
    /// First occurrence of a key.
    pub fn first(record: &EventRecord) -> Self {
        Self {
            key: record.aggregate_key(),
            country: record.country.clone(),
            hit: 1,
            latency_min: record.latency,
            latency_avg: record.latency as f64,
            latency_max: record.latency,
        }
    }

    /// Fold one more sample into the row.
    ///
    /// The average is weighted by the hit count *before* this sample.
    pub fn merge(&mut self, record: &EventRecord) {
        let latency = record.latency;
        self.latency_avg =
            (self.latency_avg * self.hit as f64 + latency as f64) / (self.hit + 1) as f64;
        self.hit += 1;
        self.latency_min = self.latency_min.min(latency);
        self.latency_max = self.latency_max.max(latency);
        if record.country.is_some() {
            self.country = record.country.clone();
        }
    }
}
