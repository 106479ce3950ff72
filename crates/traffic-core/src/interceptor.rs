//! Capture hooks called by the host HTTP pipeline.
//!
//! Each completed call is classified, timed, enriched and checked against
//! the exclusion rules, then buffered for the statistics flush and, when
//! live monitoring is on, published to the live buffer.
//!
//! Switches are read from a [`SettingsWatch`] on every hook, so toggles
//! saved by another process take effect without a restart.
//!
//! Capture can never break the call it observes: every hook runs inside a
//! guard that logs and discards both errors and panics.

use crate::aggregate::{RequestScope, StatsAggregator};
use crate::classify::{CallOutcome, HttpClassifier, RequestArgs};
use crate::enrich::{FaviconFetcher, GeoIpLookup, NoFavicons, NoGeoIp};
use crate::error::Result;
use crate::latency::LatencyTracker;
use crate::live::LiveRingBuffer;
use crate::record::{Bound, EventRecord};
use crate::settings::{ActiveSettings, CaptureSettings, SettingsWatch};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

pub struct CaptureInterceptor {
    settings: Arc<SettingsWatch>,
    classifier: HttpClassifier,
    latency: LatencyTracker,
    aggregator: Arc<StatsAggregator>,
    live: Option<Arc<LiveRingBuffer>>,
    geo: Arc<dyn GeoIpLookup>,
    favicons: Arc<dyn FaviconFetcher>,
    runtime: Option<Handle>,
}

impl CaptureInterceptor {
    pub fn builder(aggregator: Arc<StatsAggregator>) -> CaptureInterceptorBuilder {
        CaptureInterceptorBuilder::new(aggregator)
    }

    /// Settings in effect right now.
    pub fn settings(&self) -> Arc<ActiveSettings> {
        self.settings.current()
    }

    pub fn aggregator(&self) -> &Arc<StatsAggregator> {
        &self.aggregator
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    /// Whether records are currently also published to the live buffer.
    pub fn live_enabled(&self) -> bool {
        self.live.is_some() && self.settings.current().settings.live
    }

    /// Delimit one request. Everything captured until the scope drops is
    /// flushed once, when it drops.
    pub fn request_scope(&self) -> RequestScope {
        self.aggregator.scope(self.runtime.clone())
    }

    /// Called before an outbound request is sent.
    pub fn outbound_start(&self, url: &str, args: &RequestArgs) {
        if !self.settings.current().settings.outbound {
            return;
        }
        guarded("outbound_start", || {
            self.latency.start(url, args);
            Ok(())
        });
    }

    /// Called once an outbound request returned a response or failed.
    pub fn outbound_complete(
        &self,
        outcome: &CallOutcome,
        args: &RequestArgs,
        url: &str,
    ) -> Option<EventRecord> {
        self.complete(Bound::Outbound, outcome, args, url)
    }

    /// Called once an inbound request has been answered.
    pub fn inbound_complete(
        &self,
        outcome: &CallOutcome,
        args: &RequestArgs,
        url: &str,
    ) -> Option<EventRecord> {
        self.complete(Bound::Inbound, outcome, args, url)
    }

    /// Merge everything buffered so far into the store.
    pub async fn flush(&self) -> usize {
        self.aggregator.flush().await
    }

    fn complete(
        &self,
        bound: Bound,
        outcome: &CallOutcome,
        args: &RequestArgs,
        url: &str,
    ) -> Option<EventRecord> {
        let active = self.settings.current();
        if !active.settings.captures(bound) {
            return None;
        }
        let operation = match bound {
            Bound::Outbound => "outbound_complete",
            _ => "inbound_complete",
        };
        let record = guarded(operation, || self.capture(&active, bound, outcome, args, url)).flatten();

        // Outside a request scope nothing else would flush this record.
        if record.is_some() && !self.aggregator.in_scope() {
            self.aggregator.spawn_flush(self.runtime.as_ref());
        }
        record
    }

    fn capture(
        &self,
        active: &ActiveSettings,
        bound: Bound,
        outcome: &CallOutcome,
        args: &RequestArgs,
        url: &str,
    ) -> Result<Option<EventRecord>> {
        let latency = match bound {
            Bound::Outbound => self.latency.stop(url, args),
            _ => self.latency.inbound(args.started),
        };

        let mut record = self
            .classifier
            .classify(bound, url, args, outcome)
            .with_latency(latency);

        if active.exclusions.is_excluded(&record) {
            debug!(
                bound = %record.bound,
                authority = %record.authority,
                endpoint = %record.endpoint,
                "Call matches an exclusion rule, not recorded"
            );
            return Ok(None);
        }

        if record.id != "-" {
            record.country = match self.geo.lookup(&record.id) {
                Ok(country) => country,
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Country lookup failed");
                    None
                }
            };
            if bound == Bound::Outbound {
                if let Err(e) = self.favicons.prefetch(&record.id) {
                    warn!(domain = %record.id, error = %e, "Favicon prefetch failed");
                }
            }
        }

        self.aggregator.buffer(record.clone());

        if active.settings.live {
            if let Some(live) = &self.live {
                if let Err(e) = live.publish(&record) {
                    warn!(error = %e, "Dropping live record");
                }
            }
        }

        Ok(Some(record))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Run a capture step, logging and discarding any error or panic.
fn guarded<T>(operation: &str, step: impl FnOnce() -> Result<T>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(operation = operation, error = %e, "Traffic capture failed");
            None
        }
        Err(payload) => {
            warn!(
                operation = operation,
                panic = panic_message(payload.as_ref()),
                "Traffic capture panicked"
            );
            None
        }
    }
}

pub struct CaptureInterceptorBuilder {
    settings: Arc<SettingsWatch>,
    classifier: HttpClassifier,
    latency: LatencyTracker,
    aggregator: Arc<StatsAggregator>,
    live: Option<Arc<LiveRingBuffer>>,
    geo: Arc<dyn GeoIpLookup>,
    favicons: Arc<dyn FaviconFetcher>,
    runtime: Option<Handle>,
}

impl CaptureInterceptorBuilder {
    /// Picks up the current tokio runtime, if any, for background flushes.
    pub fn new(aggregator: Arc<StatsAggregator>) -> Self {
        Self {
            settings: Arc::new(SettingsWatch::fixed(CaptureSettings::default())),
            classifier: HttpClassifier::default(),
            latency: LatencyTracker::new(),
            aggregator,
            live: None,
            geo: Arc::new(NoGeoIp),
            favicons: Arc::new(NoFavicons),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Fixed settings.
    pub fn settings(mut self, settings: CaptureSettings) -> Self {
        self.settings = Arc::new(SettingsWatch::fixed(settings));
        self
    }

    /// Settings shared with a watch that follows the settings file.
    pub fn settings_watch(mut self, watch: Arc<SettingsWatch>) -> Self {
        self.settings = watch;
        self
    }

    pub fn site_id(mut self, site_id: u64) -> Self {
        self.classifier = HttpClassifier::new(site_id);
        self
    }

    pub fn latency_tracker(mut self, tracker: LatencyTracker) -> Self {
        self.latency = tracker;
        self
    }

    pub fn live(mut self, buffer: Arc<LiveRingBuffer>) -> Self {
        self.live = Some(buffer);
        self
    }

    pub fn geoip(mut self, lookup: impl GeoIpLookup) -> Self {
        self.geo = Arc::new(lookup);
        self
    }

    pub fn favicons(mut self, fetcher: impl FaviconFetcher) -> Self {
        self.favicons = Arc::new(fetcher);
        self
    }

    /// Runtime used for background flushes when hooks run on threads
    /// outside of it.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> CaptureInterceptor {
        CaptureInterceptor {
            settings: self.settings,
            classifier: self.classifier,
            latency: self.latency,
            aggregator: self.aggregator,
            live: self.live,
            geo: self.geo,
            favicons: self.favicons,
            runtime: self.runtime,
        }
    }
}
