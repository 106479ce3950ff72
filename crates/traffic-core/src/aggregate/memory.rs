use super::query::AggregateQuery;
use super::store::{sort_rows, AggregateStore};
use crate::error::Result;
use crate::record::{AggregateKey, AggregateRow, EventRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-process statistics table. Merges are serialized by the table mutex.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAggregateStore {
    rows: Arc<Mutex<BTreeMap<AggregateKey, AggregateRow>>>,
}

impl InMemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AggregateStore for InMemoryAggregateStore {
    async fn merge(&self, record: &EventRecord) -> Result<()> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.entry(record.aggregate_key())
            .and_modify(|row| row.merge(record))
            .or_insert_with(|| AggregateRow::first(record));
        Ok(())
    }

    async fn query(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>> {
        let mut rows: Vec<AggregateRow> = self
            .rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();

        sort_rows(&mut rows);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}
