//! Process-scoped wiring of the capture pipeline and its read API.

use crate::aggregate::{AggregateQuery, AggregateStore, SqliteAggregateStore, StatsAggregator};
use crate::config::TrafficConfig;
use crate::error::Result;
use crate::interceptor::{CaptureInterceptor, CaptureInterceptorBuilder};
use crate::layer::CaptureLayer;
use crate::live::{ExecutionContext, LiveRingBuffer, TailBatch};
use crate::query::{self, TailFilter};
use crate::record::{AggregateRow, Bound};
use crate::settings::{ActiveSettings, SettingsWatch};
use std::sync::Arc;

/// Owns the live buffer, the statistics store and the interceptor for one
/// process.
pub struct TrafficMonitor {
    config: TrafficConfig,
    settings: Arc<SettingsWatch>,
    live: Arc<LiveRingBuffer>,
    store: Arc<dyn AggregateStore>,
    interceptor: Arc<CaptureInterceptor>,
}

impl TrafficMonitor {
    /// Open the file-backed live buffer and the SQLite statistics store
    /// described by `config`. Capture settings follow `settings.json`.
    pub async fn open(config: TrafficConfig, context: ExecutionContext) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let settings = SettingsWatch::file(config.settings_path())
            .with_refresh_interval(config.settings_refresh());
        let store = SqliteAggregateStore::connect(&config.database_url(), &config.stats_table).await?;
        let live = LiveRingBuffer::from_config(&config, context);

        Ok(Self::with_parts(config, settings, live, Arc::new(store), |builder| builder))
    }

    /// Assemble a monitor from explicit parts. `customize` can add
    /// enrichment collaborators to the interceptor.
    pub fn with_parts(
        config: TrafficConfig,
        settings: impl Into<SettingsWatch>,
        live: LiveRingBuffer,
        store: Arc<dyn AggregateStore>,
        customize: impl FnOnce(CaptureInterceptorBuilder) -> CaptureInterceptorBuilder,
    ) -> Self {
        let settings = Arc::new(settings.into());
        let live = Arc::new(live);
        let aggregator = Arc::new(StatsAggregator::new(store.clone()));
        let builder = CaptureInterceptor::builder(aggregator)
            .settings_watch(settings.clone())
            .site_id(config.site_id)
            .live(live.clone());
        let interceptor = Arc::new(customize(builder).build());

        let active = settings.current();
        tracing::debug!(
            context = %live.context(),
            capacity = live.capacity(),
            inbound = active.settings.inbound,
            outbound = active.settings.outbound,
            live = active.settings.live,
            "Traffic monitor ready"
        );

        Self {
            config,
            settings,
            live,
            store,
            interceptor,
        }
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// Capture settings in effect right now.
    pub fn settings(&self) -> Arc<ActiveSettings> {
        self.settings.current()
    }

    pub fn live(&self) -> &Arc<LiveRingBuffer> {
        &self.live
    }

    pub fn store(&self) -> &Arc<dyn AggregateStore> {
        &self.store
    }

    pub fn interceptor(&self) -> Arc<CaptureInterceptor> {
        self.interceptor.clone()
    }

    /// Tower layer capturing inbound requests through this monitor.
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer::new(self.interceptor.clone())
    }

    /// Live entries newer than `since`, optionally narrowed to one direction
    /// and a field filter. See [`query::tail_read`].
    pub fn tail_read(
        &self,
        since: &str,
        direction: Option<Bound>,
        filter: Option<&TailFilter>,
    ) -> TailBatch {
        query::tail_read(&self.live, since, direction, filter)
    }

    /// Statistics rows matching `query`. Store failures yield no rows.
    pub async fn aggregate_query(&self, query: &AggregateQuery) -> Vec<AggregateRow> {
        match self.store.query(query).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Statistics query failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::InMemoryAggregateStore;
    use crate::classify::{CallOutcome, RequestArgs, ResponseMeta};
    use crate::live::{MemoryLock, MemorySegment};
    use crate::settings::CaptureSettings;

    fn monitor() -> TrafficMonitor {
        let live = LiveRingBuffer::new(
            MemorySegment::new("web"),
            MemorySegment::new("cli"),
            MemoryLock::new(),
            ExecutionContext::Web,
        );
        let settings = CaptureSettings {
            live: true,
            ..Default::default()
        };
        TrafficMonitor::with_parts(
            TrafficConfig::default(),
            settings,
            live,
            Arc::new(InMemoryAggregateStore::new()),
            |builder| builder,
        )
    }

    #[tokio::test]
    async fn captured_calls_reach_tail_and_statistics() {
        let monitor = monitor();
        let interceptor = monitor.interceptor();
        let ok = CallOutcome::Response(ResponseMeta::new(200));

        interceptor.inbound_complete(&ok, &RequestArgs::new("GET"), "https://site.test/a");
        interceptor.outbound_complete(&ok, &RequestArgs::new("GET"), "https://api.example.com/b");
        interceptor.flush().await;

        let all = monitor.tail_read("0", None, None);
        assert_eq!(all.items.len(), 2);

        let inbound = monitor.tail_read("0", Some(Bound::Inbound), None);
        assert_eq!(inbound.items.len(), 1);
        assert_eq!(inbound.index, all.index);

        let rows = monitor
            .aggregate_query(&AggregateQuery::new().bound(Bound::Outbound))
            .await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key.id, "example.com");
    }
}
