use super::key::LiveKey;
use super::lock::{FileLock, SegmentLock};
use super::segment::{FileSegment, LiveEntry, Segment};
use super::ExecutionContext;
use crate::config::TrafficConfig;
use crate::error::Result;
use crate::record::EventRecord;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CAPACITY: usize = 4000;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of one tail poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TailBatch {
    /// Pass back as `since` on the next poll
    pub index: String,
    pub items: Vec<LiveEntry>,
}

impl TailBatch {
    pub fn empty(since: &str) -> Self {
        Self {
            index: since.to_string(),
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Fixed-capacity, chronologically ordered log of recent records shared
/// between processes.
///
/// Every process writes to the segment of its own [`ExecutionContext`];
/// reads merge both segments into one stream. All access is serialized by
/// one [`SegmentLock`].
pub struct LiveRingBuffer {
    web: Box<dyn Segment>,
    cli: Box<dyn Segment>,
    lock: Box<dyn SegmentLock>,
    context: ExecutionContext,
    capacity: usize,
    timeout: Duration,
}

impl LiveRingBuffer {
    pub fn new(
        web: impl Segment,
        cli: impl Segment,
        lock: impl SegmentLock,
        context: ExecutionContext,
    ) -> Self {
        Self {
            web: Box::new(web),
            cli: Box::new(cli),
            lock: Box::new(lock),
            context,
            capacity: DEFAULT_CAPACITY,
            timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// File-backed buffer rooted at `dir`.
    pub fn open(dir: &Path, context: ExecutionContext) -> Self {
        Self::new(
            FileSegment::new(
                ExecutionContext::Web.as_str(),
                dir.join(ExecutionContext::Web.segment_file()),
            ),
            FileSegment::new(
                ExecutionContext::Cli.as_str(),
                dir.join(ExecutionContext::Cli.segment_file()),
            ),
            FileLock::new(dir.join("live.lock")),
            context,
        )
    }

    pub fn from_config(config: &TrafficConfig, context: ExecutionContext) -> Self {
        Self::open(&config.data_dir, context)
            .with_capacity(config.live_capacity)
            .with_lock_timeout(config.lock_timeout())
    }

    /// Zero is treated as one.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    fn segments(&self) -> (&dyn Segment, &dyn Segment) {
        match self.context {
            ExecutionContext::Web => (self.web.as_ref(), self.cli.as_ref()),
            ExecutionContext::Cli => (self.cli.as_ref(), self.web.as_ref()),
        }
    }

    /// Append `record` keyed by the current time.
    pub fn publish(&self, record: &EventRecord) -> Result<LiveKey> {
        self.publish_keyed(LiveKey::now(), record)
    }

    /// Append `record` under `key`, or just past the newest stored key if
    /// `key` would not sort last. Returns the key actually used.
    pub fn publish_keyed(&self, key: LiveKey, record: &EventRecord) -> Result<LiveKey> {
        let _guard = self.lock.acquire(self.timeout)?;
        let (own, other) = self.segments();

        let mut entries = own.load().unwrap_or_else(|e| {
            tracing::warn!(segment = own.name(), error = %e, "Discarding unreadable live segment");
            Vec::new()
        });
        let other_latest = match other.load() {
            Ok(other_entries) => other_entries.into_iter().map(|e| e.key).max(),
            Err(e) => {
                tracing::debug!(segment = other.name(), error = %e, "Skipping unreadable live segment");
                None
            }
        };

        let latest = entries.last().map(|e| e.key.clone()).max(other_latest);
        let key = match latest {
            Some(latest) if key <= latest => latest.successor(),
            _ => key,
        };

        entries.push(LiveEntry {
            key: key.clone(),
            record: record.clone(),
        });
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }
        own.store(&entries)?;

        Ok(key)
    }

    /// Entries with a key strictly greater than `since`, ascending.
    ///
    /// Never fails: lock timeouts and unreadable segments yield an empty
    /// batch that echoes `since`.
    pub fn read(&self, since: &str) -> TailBatch {
        match self.try_read(since) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(since = %since, error = %e, "Live buffer read failed");
                TailBatch::empty(since)
            }
        }
    }

    pub fn try_read(&self, since: &str) -> Result<TailBatch> {
        let _guard = self.lock.acquire(self.timeout)?;

        let mut items = self.web.load()?;
        items.extend(self.cli.load()?);
        items.retain(|entry| entry.key.as_str() > since);
        items.sort_by(|a, b| a.key.cmp(&b.key));

        let index = items
            .last()
            .map(|entry| entry.key.to_string())
            .unwrap_or_else(|| since.to_string());
        Ok(TailBatch { index, items })
    }

    /// Empty both segments.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.acquire(self.timeout)?;
        self.web.store(&[])?;
        self.cli.store(&[])?;
        Ok(())
    }

    /// Number of entries across both segments.
    pub fn len(&self) -> Result<usize> {
        let _guard = self.lock.acquire(self.timeout)?;
        Ok(self.web.load()?.len() + self.cli.load()?.len())
    }
}
