//! Per-call duration measurement.
//!
//! Outbound calls are timed between a start hook and a completion hook that
//! share a correlation key. Inbound calls are timed from the host-provided
//! request start. Both fall back to the instant the tracker was created.
//!
//! Starts that never complete are evicted once older than the tracker's
//! maximum age.

use crate::classify::RequestArgs;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Age after which an uncompleted outbound start is forgotten.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

pub struct LatencyTracker {
    fallback: Instant,
    max_age: Duration,
    chrono: Mutex<HashMap<String, Instant>>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::with_fallback(Instant::now())
    }

    /// Use `fallback` as the start time when no better one is known.
    pub fn with_fallback(fallback: Instant) -> Self {
        Self {
            fallback,
            max_age: DEFAULT_MAX_AGE,
            chrono: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Key pairing the start and completion hooks of one outbound call.
    pub fn correlation_key(url: &str, args: &RequestArgs) -> String {
        let serialized = serde_json::to_string(args).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(serialized.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn start(&self, url: &str, args: &RequestArgs) {
        self.start_at(url, args, Instant::now());
    }

    pub fn start_at(&self, url: &str, args: &RequestArgs, at: Instant) {
        let key = Self::correlation_key(url, args);
        let mut chrono = self.chrono.lock().unwrap_or_else(|e| e.into_inner());
        evict_stale(&mut chrono, self.max_age);
        chrono.insert(key, at);
    }

    /// Forget starts older than the maximum age. Returns how many were dropped.
    pub fn expire(&self) -> usize {
        let mut chrono = self.chrono.lock().unwrap_or_else(|e| e.into_inner());
        evict_stale(&mut chrono, self.max_age)
    }

    /// Latency of an outbound call in milliseconds, consuming its start entry.
    pub fn stop(&self, url: &str, args: &RequestArgs) -> u64 {
        let key = Self::correlation_key(url, args);
        let started = self
            .chrono
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);

        let started = match started {
            Some(at) => at,
            None => {
                tracing::warn!(
                    url = %url,
                    key = %key,
                    "No start recorded for outbound call, measuring from tracker start"
                );
                self.fallback
            }
        };
        to_millis(started.elapsed())
    }

    /// Latency of an inbound request in milliseconds.
    pub fn inbound(&self, request_start: Option<Instant>) -> u64 {
        to_millis(request_start.unwrap_or(self.fallback).elapsed())
    }

    /// Number of outbound calls started but not yet completed.
    pub fn pending(&self) -> usize {
        self.chrono.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn evict_stale(chrono: &mut HashMap<String, Instant>, max_age: Duration) -> usize {
    let before = chrono.len();
    chrono.retain(|_, started| started.elapsed() <= max_age);
    let evicted = before - chrono.len();
    if evicted > 0 {
        tracing::debug!(evicted = evicted, "Evicted outbound starts that never completed");
    }
    evicted
}

/// Whole milliseconds, rounded half away from zero.
pub fn to_millis(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(to_millis(Duration::from_micros(1_499)), 1);
        assert_eq!(to_millis(Duration::from_micros(1_500)), 2);
        assert_eq!(to_millis(Duration::from_micros(400)), 0);
        assert_eq!(to_millis(Duration::ZERO), 0);
    }

    #[test]
    fn correlation_key_depends_on_url_and_args() {
        let get = RequestArgs::new("GET");
        let post = RequestArgs::new("POST");
        let a = LatencyTracker::correlation_key("https://example.com/", &get);
        assert_eq!(a, LatencyTracker::correlation_key("https://example.com/", &get));
        assert_ne!(a, LatencyTracker::correlation_key("https://example.com/", &post));
        assert_ne!(a, LatencyTracker::correlation_key("https://example.org/", &get));
    }

    #[test]
    fn stop_consumes_the_matching_start() {
        let tracker = LatencyTracker::new();
        let args = RequestArgs::new("GET");
        let earlier = Instant::now() - Duration::from_millis(250);
        tracker.start_at("https://example.com/", &args, earlier);
        assert_eq!(tracker.pending(), 1);

        let latency = tracker.stop("https://example.com/", &args);
        assert!(latency >= 250);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn missing_start_falls_back_to_tracker_creation() {
        let tracker = LatencyTracker::with_fallback(Instant::now() - Duration::from_secs(2));
        let latency = tracker.stop("https://example.com/", &RequestArgs::new("GET"));
        assert!(latency >= 2_000);
    }

    #[test]
    fn inbound_prefers_request_start() {
        let tracker = LatencyTracker::with_fallback(Instant::now() - Duration::from_secs(60));
        let start = Instant::now() - Duration::from_millis(40);
        let latency = tracker.inbound(Some(start));
        assert!((40..60_000).contains(&latency));
        assert!(tracker.inbound(None) >= 60_000);
    }

    #[test]
    fn abandoned_starts_are_evicted() {
        let tracker = LatencyTracker::new().with_max_age(Duration::from_secs(1));
        let args = RequestArgs::new("GET");
        let long_ago = Instant::now() - Duration::from_secs(5);

        tracker.start_at("https://example.com/cancelled", &args, long_ago);
        assert_eq!(tracker.pending(), 1);

        tracker.start("https://example.com/next", &args);
        assert_eq!(tracker.pending(), 1);

        tracker.start_at("https://example.com/abandoned", &args, long_ago);
        assert_eq!(tracker.pending(), 2);
        assert_eq!(tracker.expire(), 1);
        assert_eq!(tracker.pending(), 1);
        assert!(tracker.stop("https://example.com/next", &args) < 1_000);
    }
}
