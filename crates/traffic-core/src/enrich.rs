//! Pluggable enrichment collaborators.
//!
//! Country lookup and favicon prefetching are owned by the embedding host.
//! Both default to no-ops so capture works without them.

use crate::error::Result;

/// Resolves a host name or IP address to an ISO-3166 alpha-2 country code.
pub trait GeoIpLookup: Send + Sync + 'static {
    fn lookup(&self, host_or_ip: &str) -> Result<Option<String>>;
}

/// Fire-and-forget fetcher of domain metadata such as favicons.
///
/// Errors are logged by the caller and otherwise ignored.
pub trait FaviconFetcher: Send + Sync + 'static {
    fn prefetch(&self, domain: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeoIp;

impl GeoIpLookup for NoGeoIp {
    fn lookup(&self, _host_or_ip: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoFavicons;

impl FaviconFetcher for NoFavicons {
    fn prefetch(&self, _domain: &str) -> Result<()> {
        Ok(())
    }
}

/// Fixed-table lookup, handy for tests and small deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoIp {
    entries: std::collections::HashMap<String, String>,
}

impl StaticGeoIp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, host_or_ip: impl Into<String>, country: impl Into<String>) -> Self {
        self.entries
            .insert(host_or_ip.into().to_ascii_lowercase(), country.into().to_ascii_uppercase());
        self
    }
}

impl GeoIpLookup for StaticGeoIp {
    fn lookup(&self, host_or_ip: &str) -> Result<Option<String>> {
        Ok(self.entries.get(&host_or_ip.to_ascii_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_lookup_is_case_insensitive() {
        let geo = StaticGeoIp::new().with_entry("Example.COM", "fr");
        assert_eq!(geo.lookup("example.com").unwrap(), Some("FR".to_string()));
        assert_eq!(geo.lookup("example.org").unwrap(), None);
        assert_eq!(NoGeoIp.lookup("example.com").unwrap(), None);
    }
}
