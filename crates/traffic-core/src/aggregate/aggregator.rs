use super::store::AggregateStore;
use crate::record::EventRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Records held between flushes before new ones are dropped.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Buffers records during a request and merges them into the store at the end.
///
/// A flush drains the whole buffer once. If the store fails, the remaining
/// records of that flush are dropped; statistics are best-effort.
///
/// A request is delimited by a [`RequestScope`]. Records captured while any
/// scope is open are flushed when a scope closes.
pub struct StatsAggregator {
    store: Arc<dyn AggregateStore>,
    buffer: Mutex<Vec<EventRecord>>,
    max_pending: usize,
    open_scopes: AtomicUsize,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn AggregateStore>) -> Self {
        Self {
            store,
            buffer: Mutex::new(Vec::new()),
            max_pending: DEFAULT_MAX_PENDING,
            open_scopes: AtomicUsize::new(0),
        }
    }

    /// Clamped to at least one record.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn AggregateStore> {
        &self.store
    }

    /// Queue `record` for the next flush. Returns false when the buffer is
    /// full and the record was dropped.
    pub fn buffer(&self, record: EventRecord) -> bool {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if buffer.len() >= self.max_pending {
            warn!(
                pending = buffer.len(),
                "Statistics buffer full, dropping record"
            );
            return false;
        }
        buffer.push(record);
        true
    }

    /// Whether a request scope is currently open.
    pub fn in_scope(&self) -> bool {
        self.open_scopes.load(Ordering::Acquire) > 0
    }

    /// Open a request scope. Dropping it schedules a flush on `runtime`, or
    /// on the current runtime when `runtime` is `None`.
    pub fn scope(self: &Arc<Self>, runtime: Option<Handle>) -> RequestScope {
        self.open_scopes.fetch_add(1, Ordering::AcqRel);
        RequestScope {
            aggregator: self.clone(),
            runtime,
        }
    }

    /// Flush in the background. Without a runtime the records stay buffered
    /// for a later flush.
    pub fn spawn_flush(self: &Arc<Self>, runtime: Option<&Handle>) {
        let handle = match runtime.cloned().or_else(|| Handle::try_current().ok()) {
            Some(handle) => handle,
            None => {
                debug!(pending = self.pending(), "No async runtime, statistics flush deferred");
                return;
            }
        };
        let aggregator = self.clone();
        handle.spawn(async move {
            aggregator.flush().await;
        });
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Merge every buffered record in capture order. Returns how many were merged.
    pub async fn flush(&self) -> usize {
        let records = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(|e| e.into_inner()));
        if records.is_empty() {
            return 0;
        }

        let total = records.len();
        for (merged, record) in records.iter().enumerate() {
            if let Err(e) = self.store.merge(record).await {
                warn!(
                    merged = merged,
                    dropped = total - merged,
                    error = %e,
                    "Failed to flush traffic statistics"
                );
                return merged;
            }
        }
        total
    }
}

/// Guard for one request lifecycle. See [`StatsAggregator::scope`].
#[must_use = "the flush runs when the scope is dropped"]
pub struct RequestScope {
    aggregator: Arc<StatsAggregator>,
    runtime: Option<Handle>,
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.aggregator.open_scopes.fetch_sub(1, Ordering::AcqRel);
        self.aggregator.spawn_flush(self.runtime.as_ref());
    }
}
