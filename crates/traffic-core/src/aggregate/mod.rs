//! Durable per-day statistics.
//!
//! Records are buffered by a [`StatsAggregator`] while a request runs and
//! merged into an [`AggregateStore`] when it ends. Rows are keyed by
//! (date, site, bound, id, verb, scheme, authority, endpoint, code) and carry
//! a hit count plus min/avg/max latency.

mod aggregator;
mod memory;
mod query;
mod sqlite;
mod store;

pub use aggregator::{RequestScope, StatsAggregator, DEFAULT_MAX_PENDING};
pub use memory::InMemoryAggregateStore;
pub use query::AggregateQuery;
pub use sqlite::SqliteAggregateStore;
pub use store::AggregateStore;
