//! Cross-process live ring buffer.
//!
//! Recent records are kept in two storage segments, one per execution
//! context, guarded by a single named lock. Web workers and CLI invocations
//! each append to their own segment; a tail viewer reads both and sees one
//! chronological stream.
//!
//! # Example
//!
//! ```ignore
//! use traffic_core::live::{ExecutionContext, LiveRingBuffer};
//!
//! let buffer = LiveRingBuffer::open(Path::new("./traffic-data"), ExecutionContext::Web);
//! buffer.publish(&record)?;
//!
//! let batch = buffer.read("0");
//! for entry in &batch.items {
//!     println!("{} {}", entry.key, entry.record.endpoint);
//! }
//! // next poll continues from batch.index
//! ```

mod buffer;
mod key;
mod lock;
mod segment;

pub use buffer::{LiveRingBuffer, TailBatch, DEFAULT_CAPACITY, DEFAULT_LOCK_TIMEOUT};
pub use key::{LiveKey, KEY_FORMAT};
pub use lock::{FileLock, LockGuard, MemoryLock, SegmentLock};
pub use segment::{FileSegment, LiveEntry, MemorySegment, Segment};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of process writing to the buffer. Each kind owns one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    #[default]
    Web,
    Cli,
}

impl ExecutionContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Cli => "cli",
        }
    }

    pub fn segment_file(&self) -> &'static str {
        match self {
            Self::Web => "live-web.json",
            Self::Cli => "live-cli.json",
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
