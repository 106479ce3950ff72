//! Storage segments backing the live buffer.
//!
//! A segment holds the entries written by one execution context. Callers
//! serialize access through a [`SegmentLock`](super::SegmentLock); segments
//! themselves do no locking.

use super::key::LiveKey;
use crate::error::Result;
use crate::record::EventRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEntry {
    pub key: LiveKey,
    pub record: EventRecord,
}

pub trait Segment: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// All entries, ascending by key. A segment that does not exist yet is empty.
    fn load(&self) -> Result<Vec<LiveEntry>>;

    fn store(&self, entries: &[LiveEntry]) -> Result<()>;
}

/// JSON array in a file, replaced atomically on every store.
#[derive(Debug, Clone)]
pub struct FileSegment {
    name: String,
    path: PathBuf,
}

impl FileSegment {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Segment for FileSegment {
    fn name(&self) -> &str {
        &self.name
    }

    /// Entries that fail to parse, such as ones with a malformed key, are
    /// dropped; a file that is not a JSON array is an error.
    fn load(&self) -> Result<Vec<LiveEntry>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => return Ok(Vec::new()),
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let raw: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;
        let total = raw.len();
        let mut entries: Vec<LiveEntry> = raw
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        if entries.len() < total {
            tracing::warn!(
                segment = %self.name,
                dropped = total - entries.len(),
                "Dropping malformed live entries"
            );
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn store(&self, entries: &[LiveEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySegment {
    name: String,
    entries: Arc<Mutex<Vec<LiveEntry>>>,
}

impl MemorySegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Arc::default(),
        }
    }
}

impl Segment for MemorySegment {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<LiveEntry>> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn store(&self, entries: &[LiveEntry]) -> Result<()> {
        *self.entries.lock().unwrap_or_else(|e| e.into_inner()) = entries.to_vec();
        Ok(())
    }
}
