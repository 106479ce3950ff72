use super::query::AggregateQuery;
use crate::error::Result;
use crate::record::{AggregateRow, EventRecord};
use async_trait::async_trait;

/// Durable store of per-day statistics.
///
/// `merge` must apply the whole accumulate-or-insert for one record
/// atomically, so concurrent writers never merge against a stale hit count.
#[async_trait]
pub trait AggregateStore: Send + Sync + 'static {
    /// Insert a fresh row for the record's key, or fold the record into the existing one.
    async fn merge(&self, record: &EventRecord) -> Result<()>;

    /// Rows matching `query`, busiest first.
    async fn query(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>>;
}

/// Busiest first, then by key so results are stable.
pub(crate) fn sort_rows(rows: &mut [AggregateRow]) {
    rows.sort_by(|a, b| b.hit.cmp(&a.hit).then_with(|| a.key.cmp(&b.key)));
}
