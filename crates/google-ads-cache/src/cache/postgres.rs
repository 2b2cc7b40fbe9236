//! Networked relational storage backend (PostgreSQL)
//!
//! Uses a bounded `deadpool-postgres` pool. Waiting longer than the
//! configured pool wait fails with [`StorageError::PoolExhausted`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{
    Config, ManagerConfig, Object, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime,
};
use tokio_postgres::{NoTls, Row};

use super::config::{BackendKind, PostgresConfig, SslMode};
use super::entry::{CacheEntry, EntryFilter, EntrySummary, ScopeMetadata};
use super::error::{StorageError, StorageResult};
use super::key::{EntityType, ScopeParams};
use super::provider::{StorageBackend, StorageStats};

const BACKEND: BackendKind = BackendKind::Postgres;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key    TEXT PRIMARY KEY,
    entity_type  TEXT NOT NULL,
    customer_id  TEXT NOT NULL,
    scope_params TEXT NOT NULL,
    payload      TEXT NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    expires_at   TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_scope
    ON cache_entries (entity_type, customer_id);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at
    ON cache_entries (expires_at);
";

const SELECT_ENTRY: &str = "SELECT cache_key, entity_type, customer_id, scope_params, payload, \
     created_at, expires_at FROM cache_entries WHERE cache_key = $1";

const UPSERT_ENTRY: &str = "INSERT INTO cache_entries \
     (cache_key, entity_type, customer_id, scope_params, payload, created_at, expires_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7) \
     ON CONFLICT (cache_key) DO UPDATE SET \
     entity_type = EXCLUDED.entity_type, customer_id = EXCLUDED.customer_id, \
     scope_params = EXCLUDED.scope_params, payload = EXCLUDED.payload, \
     created_at = EXCLUDED.created_at, expires_at = EXCLUDED.expires_at";

const LIST_ENTRIES: &str = "SELECT cache_key, entity_type, customer_id, scope_params, \
     octet_length(payload)::BIGINT, created_at, expires_at FROM cache_entries \
     WHERE ($1::TEXT IS NULL OR entity_type = $1) AND ($2::TEXT IS NULL OR customer_id = $2) \
     ORDER BY created_at DESC LIMIT $3";

const STATS: &str = "SELECT COUNT(*)::BIGINT, \
     COALESCE(SUM(CASE WHEN expires_at <= $1 THEN 1 ELSE 0 END), 0)::BIGINT, \
     COALESCE(SUM(octet_length(payload)), 0)::BIGINT FROM cache_entries";

fn map_pool_error(err: PoolError) -> StorageError {
    match err {
        PoolError::Timeout(_) => StorageError::PoolExhausted {
            backend: BACKEND,
            message: "timed out waiting for a connection".to_string(),
        },
        PoolError::Closed => StorageError::Closed { backend: BACKEND },
        other => StorageError::read(BACKEND, other),
    }
}

fn read_err(err: impl ToString) -> StorageError {
    StorageError::read(BACKEND, err)
}

fn write_err(err: impl ToString) -> StorageError {
    StorageError::write(BACKEND, err)
}

fn entity_from_column(row: &Row, idx: usize) -> StorageResult<EntityType> {
    row.try_get::<_, String>(idx)
        .map_err(read_err)?
        .parse()
        .map_err(read_err)
}

fn params_from_column(row: &Row, idx: usize) -> StorageResult<ScopeParams> {
    let raw: String = row.try_get(idx).map_err(read_err)?;
    ScopeParams::from_json(&raw).map_err(read_err)
}

fn entry_from_row(row: &Row) -> StorageResult<CacheEntry> {
    Ok(CacheEntry {
        key: row.try_get(0).map_err(read_err)?,
        scope: ScopeMetadata {
            entity_type: entity_from_column(row, 1)?,
            customer_id: row.try_get(2).map_err(read_err)?,
            params: params_from_column(row, 3)?,
        },
        payload: row.try_get(4).map_err(read_err)?,
        created_at: row.try_get(5).map_err(read_err)?,
        expires_at: row.try_get(6).map_err(read_err)?,
    })
}

fn summary_from_row(row: &Row) -> StorageResult<EntrySummary> {
    let payload_bytes: i64 = row.try_get(4).map_err(read_err)?;
    Ok(EntrySummary {
        key: row.try_get(0).map_err(read_err)?,
        entity_type: entity_from_column(row, 1)?,
        customer_id: row.try_get(2).map_err(read_err)?,
        params: params_from_column(row, 3)?,
        payload_bytes: u64::try_from(payload_bytes).unwrap_or_default(),
        created_at: row.try_get(5).map_err(read_err)?,
        expires_at: row.try_get(6).map_err(read_err)?,
    })
}

/// PostgreSQL-backed [`StorageBackend`]
#[derive(Clone)]
pub struct PostgresBackend {
    pool: Pool,
    target: String,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PostgresBackend")
            .field("target", &self.target)
            .field("pool_size", &status.size)
            .field("pool_max_size", &status.max_size)
            .finish()
    }
}

impl PostgresBackend {
    /// Build the pool. No connection is opened until [`initialize`](StorageBackend::initialize).
    pub fn new(config: &PostgresConfig, pool_wait: Duration) -> StorageResult<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.user.clone());
        cfg.password.clone_from(&config.password);
        cfg.connect_timeout = Some(CONNECT_TIMEOUT);
        cfg.ssl_mode = Some(match config.ssl_mode {
            SslMode::Disable => deadpool_postgres::SslMode::Disable,
            SslMode::Prefer => deadpool_postgres::SslMode::Prefer,
        });
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(pool_wait);
        pool_config.timeouts.create = Some(CONNECT_TIMEOUT);
        pool_config.timeouts.recycle = Some(CONNECT_TIMEOUT);
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::init(BACKEND, e))?;

        Ok(Self {
            pool,
            target: format!("{}:{}/{}", config.host, config.port, config.database),
        })
    }

    async fn conn(&self) -> StorageResult<Object> {
        self.pool.get().await.map_err(map_pool_error)
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn initialize(&self) -> StorageResult<()> {
        let conn = self.pool.get().await.map_err(|e| match map_pool_error(e) {
            closed @ StorageError::Closed { .. } => closed,
            other => StorageError::init(BACKEND, format!("{} unreachable: {other}", self.target)),
        })?;
        conn.batch_execute(SCHEMA)
            .await
            .map_err(|e| StorageError::init(BACKEND, e))?;

        tracing::debug!(cache.backend = "postgres", target = %self.target, "Schema ready");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<CacheEntry>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(SELECT_ENTRY, &[&key])
            .await
            .map_err(read_err)?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn put(&self, entry: &CacheEntry) -> StorageResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            UPSERT_ENTRY,
            &[
                &entry.key,
                &entry.scope.entity_type.as_str(),
                &entry.scope.customer_id,
                &entry.scope.params.canonical(),
                &entry.payload,
                &entry.created_at,
                &entry.expires_at,
            ],
        )
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let conn = self.conn().await?;
        let removed = conn
            .execute("DELETE FROM cache_entries WHERE cache_key = $1", &[&key])
            .await
            .map_err(write_err)?;
        Ok(removed > 0)
    }

    async fn delete_by_scope(
        &self,
        entity_type: EntityType,
        customer_id: Option<&str>,
    ) -> StorageResult<u64> {
        let conn = self.conn().await?;
        conn.execute(
            "DELETE FROM cache_entries WHERE entity_type = $1 \
             AND ($2::TEXT IS NULL OR customer_id = $2)",
            &[&entity_type.as_str(), &customer_id],
        )
        .await
        .map_err(write_err)
    }

    async fn delete_by_customer(&self, customer_id: &str) -> StorageResult<u64> {
        let conn = self.conn().await?;
        conn.execute(
            "DELETE FROM cache_entries WHERE customer_id = $1",
            &[&customer_id],
        )
        .await
        .map_err(write_err)
    }

    async fn clear_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let conn = self.conn().await?;
        conn.execute("DELETE FROM cache_entries WHERE expires_at <= $1", &[&now])
            .await
            .map_err(write_err)
    }

    async fn clear_all(&self) -> StorageResult<()> {
        let conn = self.conn().await?;
        conn.execute("DELETE FROM cache_entries", &[])
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn list_entries(&self, filter: &EntryFilter) -> StorageResult<Vec<EntrySummary>> {
        let entity_type = filter.entity_type.map(|e| e.as_str());
        let limit = filter.limit.and_then(|l| i64::try_from(l).ok());

        let conn = self.conn().await?;
        let rows = conn
            .query(LIST_ENTRIES, &[&entity_type, &filter.customer_id, &limit])
            .await
            .map_err(read_err)?;
        rows.iter().map(summary_from_row).collect()
    }

    async fn stats(&self, now: DateTime<Utc>) -> StorageResult<StorageStats> {
        let conn = self.conn().await?;
        let totals = conn.query_one(STATS, &[&now]).await.map_err(read_err)?;
        let total: i64 = totals.try_get(0).map_err(read_err)?;
        let expired: i64 = totals.try_get(1).map_err(read_err)?;
        let bytes: i64 = totals.try_get(2).map_err(read_err)?;

        let mut entries_by_type = BTreeMap::new();
        for row in conn
            .query(
                "SELECT entity_type, COUNT(*)::BIGINT FROM cache_entries GROUP BY entity_type",
                &[],
            )
            .await
            .map_err(read_err)?
        {
            let name: String = row.try_get(0).map_err(read_err)?;
            let count: i64 = row.try_get(1).map_err(read_err)?;
            if let Ok(entity_type) = name.parse::<EntityType>() {
                entries_by_type.insert(entity_type, u64::try_from(count).unwrap_or_default());
            }
        }

        Ok(StorageStats {
            total_entries: u64::try_from(total).unwrap_or_default(),
            expired_entries: u64::try_from(expired).unwrap_or_default(),
            entries_by_type,
            payload_bytes: u64::try_from(bytes).unwrap_or_default(),
        })
    }

    async fn health_check(&self) -> StorageResult<()> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(read_err)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }

    fn kind(&self) -> BackendKind {
        BACKEND
    }
}
