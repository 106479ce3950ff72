use super::query::AggregateQuery;
use super::store::AggregateStore;
use crate::error::{Result, TrafficError};
use crate::record::{AggregateKey, AggregateRow, Bound, EventRecord, Scheme, Verb};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

const DATE_FORMAT: &str = "%Y-%m-%d";

const COLUMNS: &str = "timestamp, site, context, id, verb, scheme, authority, endpoint, code, \
                       country, hit, latency_min, latency_avg, latency_max";

/// SQLite-backed statistics table.
///
/// Each merge is a single `INSERT .. ON CONFLICT DO UPDATE` statement, so
/// the accumulate step is evaluated by the database against the row as it
/// is at that moment.
#[derive(Debug, Clone)]
pub struct SqliteAggregateStore {
    pool: SqlitePool,
    table_name: String,
}

impl SqliteAggregateStore {
    pub fn new(pool: SqlitePool, table_name: &str) -> Self {
        Self {
            pool,
            table_name: table_name.to_string(),
        }
    }

    /// Open a pool on `url` and create the table if needed.
    pub async fn connect(url: &str, table_name: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        let store = Self::new(pool, table_name);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the database schema
    pub async fn ensure_schema(&self) -> Result<()> {
        let table = &self.table_name;
        let create = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                timestamp TEXT NOT NULL,
                site INTEGER NOT NULL DEFAULT 0,
                context TEXT NOT NULL DEFAULT 'unknown',
                id TEXT NOT NULL DEFAULT '-',
                verb TEXT NOT NULL DEFAULT 'unknown',
                scheme TEXT NOT NULL DEFAULT 'unknown',
                authority TEXT NOT NULL DEFAULT '-',
                endpoint TEXT NOT NULL DEFAULT '-',
                code INTEGER NOT NULL DEFAULT 0,
                country TEXT,
                hit INTEGER NOT NULL DEFAULT 1,
                latency_min INTEGER NOT NULL DEFAULT 0,
                latency_avg REAL NOT NULL DEFAULT 0,
                latency_max INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (timestamp, site, context, id, verb, scheme, authority, endpoint, code)
            )
            "#
        );
        sqlx::query(&create).execute(&self.pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_context ON {table} (context, timestamp)"
        );
        sqlx::query(&index).execute(&self.pool).await?;

        Ok(())
    }

    fn row_from_sql(row: &SqliteRow) -> Result<AggregateRow> {
        let date: String = row.try_get("timestamp")?;
        let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| TrafficError::Store(format!("bad timestamp '{}': {}", date, e)))?;
        let context: String = row.try_get("context")?;
        let verb: String = row.try_get("verb")?;
        let scheme: String = row.try_get("scheme")?;
        let code: i64 = row.try_get("code")?;

        Ok(AggregateRow {
            key: AggregateKey {
                date,
                site_id: row.try_get::<i64, _>("site")?.max(0) as u64,
                bound: Bound::parse_lossy(&context),
                id: row.try_get("id")?,
                verb: Verb::parse_lossy(&verb),
                scheme: Scheme::parse_lossy(&scheme),
                authority: row.try_get("authority")?,
                endpoint: row.try_get("endpoint")?,
                code: u16::try_from(code).unwrap_or(0),
            },
            country: row.try_get("country")?,
            hit: row.try_get::<i64, _>("hit")?.max(0) as u64,
            latency_min: row.try_get::<i64, _>("latency_min")?.max(0) as u64,
            latency_avg: row.try_get("latency_avg")?,
            latency_max: row.try_get::<i64, _>("latency_max")?.max(0) as u64,
        })
    }
}

#[async_trait]
impl AggregateStore for SqliteAggregateStore {
    async fn merge(&self, record: &EventRecord) -> Result<()> {
        let query = format!(
            r#"
            INSERT INTO {table} ({COLUMNS})
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            ON CONFLICT (timestamp, site, context, id, verb, scheme, authority, endpoint, code)
            DO UPDATE SET
                hit = hit + 1,
                latency_min = MIN(latency_min, excluded.latency_min),
                latency_max = MAX(latency_max, excluded.latency_max),
                latency_avg = (latency_avg * hit + excluded.latency_avg) / (hit + 1),
                country = COALESCE(excluded.country, country)
            "#,
            table = self.table_name
        );

        let latency = record.latency as i64;
        sqlx::query(&query)
            .bind(record.timestamp.date_naive().format(DATE_FORMAT).to_string())
            .bind(record.site_id as i64)
            .bind(record.bound.as_str())
            .bind(&record.id)
            .bind(record.verb.as_str())
            .bind(record.scheme.as_str())
            .bind(&record.authority)
            .bind(&record.endpoint)
            .bind(record.code as i64)
            .bind(&record.country)
            .bind(latency)
            .bind(latency as f64)
            .bind(latency)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn query(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {COLUMNS} FROM {} WHERE 1 = 1",
            self.table_name
        ));

        if let Some(from) = query.from {
            builder
                .push(" AND timestamp >= ")
                .push_bind(from.format(DATE_FORMAT).to_string());
        }
        if let Some(to) = query.to {
            builder
                .push(" AND timestamp <= ")
                .push_bind(to.format(DATE_FORMAT).to_string());
        }
        if let Some(site) = query.site_id {
            builder.push(" AND site = ").push_bind(site as i64);
        }
        if let Some(bound) = query.bound {
            builder.push(" AND context = ").push_bind(bound.as_str());
        }
        if let Some(ref id) = query.id {
            builder.push(" AND id = ").push_bind(id.clone());
        }
        if let Some(verb) = query.verb {
            builder.push(" AND verb = ").push_bind(verb.as_str());
        }
        if let Some(ref authority) = query.authority {
            builder.push(" AND authority = ").push_bind(authority.clone());
        }
        if let Some(code) = query.code {
            builder.push(" AND code = ").push_bind(code as i64);
        }

        builder.push(" ORDER BY hit DESC, timestamp, site, context, id, verb, scheme, authority, endpoint, code");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_from_sql).collect()
    }
}
