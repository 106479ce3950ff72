//! # traffic-core
//!
//! Capture of inbound and outbound HTTP traffic, with two outputs:
//!
//! - durable per-day statistics, merged with single-statement upserts
//!   (hit count, min/avg/max latency), and
//! - a bounded live buffer shared between processes for near-real-time
//!   tailing.
//!
//! ```ignore
//! use traffic_core::{ExecutionContext, TrafficConfig, TrafficMonitor};
//!
//! let monitor = TrafficMonitor::open(TrafficConfig::from_env()?, ExecutionContext::Web).await?;
//!
//! // inbound: wrap the app service
//! let app = tower::ServiceBuilder::new().layer(monitor.layer()).service(app);
//!
//! // outbound: call the hooks around each request. Calls made inside a
//! // request scope are flushed when the scope drops; calls made outside
//! // any scope (background jobs) are flushed right after completion.
//! let interceptor = monitor.interceptor();
//! let scope = interceptor.request_scope();
//! interceptor.outbound_start(url, &args);
//! interceptor.outbound_complete(&outcome, &args, url);
//! drop(scope);
//!
//! // tail
//! let batch = monitor.tail_read("0", None, None);
//! ```

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod format;
pub mod interceptor;
pub mod latency;
pub mod layer;
pub mod live;
pub mod monitor;
pub mod query;
pub mod record;
pub mod settings;
pub mod status;

pub use aggregate::{
    AggregateQuery, AggregateStore, InMemoryAggregateStore, RequestScope, SqliteAggregateStore,
    StatsAggregator,
};
pub use classify::{CallOutcome, HttpClassifier, RequestArgs, ResponseMeta, TransportError};
pub use config::TrafficConfig;
pub use enrich::{FaviconFetcher, GeoIpLookup};
pub use error::{Result, TrafficError};
pub use filter::{ExclusionRule, ExclusionRules};
pub use format::{format_line, FormattedLine};
pub use interceptor::CaptureInterceptor;
pub use latency::LatencyTracker;
pub use layer::{CaptureLayer, CaptureService, RequestStart};
pub use live::{ExecutionContext, LiveEntry, LiveKey, LiveRingBuffer, TailBatch};
pub use monitor::TrafficMonitor;
pub use query::TailFilter;
pub use record::{AggregateKey, AggregateRow, Bound, EventRecord, Field, Scheme, Verb};
pub use settings::{ActiveSettings, CaptureSettings, SettingsWatch};
