//! Embedded-file storage backend (SQLite)
//!
//! Connections come from a bounded `deadpool` pool and every statement runs
//! on the blocking thread pool so the async executor is never blocked.
//! Timestamps are stored as INTEGER Unix epoch milliseconds (UTC).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool::Runtime;
use deadpool::managed::{self, Metrics, PoolError, RecycleResult};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::config::{BackendKind, SqliteConfig};
use super::entry::{CacheEntry, EntryFilter, EntrySummary, ScopeMetadata};
use super::error::{StorageError, StorageResult};
use super::key::{EntityType, ScopeParams};
use super::provider::{StorageBackend, StorageStats};

const BACKEND: BackendKind = BackendKind::Sqlite;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CREATE_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key    TEXT PRIMARY KEY,
    entity_type  TEXT NOT NULL,
    customer_id  TEXT NOT NULL,
    scope_params TEXT NOT NULL,
    payload      TEXT NOT NULL,
    created_at   INTEGER NOT NULL,
    expires_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_scope
    ON cache_entries (entity_type, customer_id);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at
    ON cache_entries (expires_at);
";

const SELECT_ENTRY: &str = "SELECT cache_key, entity_type, customer_id, scope_params, payload, \
     created_at, expires_at FROM cache_entries WHERE cache_key = ?1";

const UPSERT_ENTRY: &str = "INSERT OR REPLACE INTO cache_entries \
     (cache_key, entity_type, customer_id, scope_params, payload, created_at, expires_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const LIST_ENTRIES: &str = "SELECT cache_key, entity_type, customer_id, scope_params, \
     LENGTH(CAST(payload AS BLOB)), created_at, expires_at FROM cache_entries \
     WHERE (?1 IS NULL OR entity_type = ?1) AND (?2 IS NULL OR customer_id = ?2) \
     ORDER BY created_at DESC LIMIT ?3";

pub type SqlitePool = managed::Pool<SqliteManager>;

/// Opens `rusqlite` connections for the pool
#[derive(Debug)]
pub struct SqliteManager {
    path: PathBuf,
}

impl SqliteManager {
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl managed::Manager for SqliteManager {
    type Type = Connection;
    type Error = StorageError;

    async fn create(&self) -> Result<Connection, StorageError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || open_connection(&path))
            .await
            .map_err(|e| StorageError::init(BACKEND, e))?
    }

    async fn recycle(&self, _conn: &mut Connection, _: &Metrics) -> RecycleResult<Self::Error> {
        // Broken connections surface as statement errors on next use.
        Ok(())
    }
}

fn open_connection(path: &Path) -> StorageResult<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::init(BACKEND, format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let conn = Connection::open(path).map_err(|e| {
        StorageError::init(BACKEND, format!("cannot open {}: {e}", path.display()))
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| StorageError::init(BACKEND, e))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .map_err(|e| StorageError::init(BACKEND, e))?;
    Ok(conn)
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn error(self, err: impl ToString) -> StorageError {
        match self {
            Self::Read => StorageError::read(BACKEND, err),
            Self::Write => StorageError::write(BACKEND, err),
        }
    }
}

fn map_pool_error(err: PoolError<StorageError>) -> StorageError {
    match err {
        PoolError::Timeout(_) => StorageError::PoolExhausted {
            backend: BACKEND,
            message: "timed out waiting for a connection".to_string(),
        },
        PoolError::Closed => StorageError::Closed { backend: BACKEND },
        PoolError::Backend(e) => e,
        other => StorageError::read(BACKEND, other),
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn entity_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<EntityType> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn params_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<ScopeParams> {
    let raw: String = row.get(idx)?;
    ScopeParams::from_json(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        key: row.get(0)?,
        scope: ScopeMetadata {
            entity_type: entity_from_column(row, 1)?,
            customer_id: row.get(2)?,
            params: params_from_column(row, 3)?,
        },
        payload: row.get(4)?,
        created_at: from_millis(5, row.get(5)?)?,
        expires_at: from_millis(6, row.get(6)?)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<EntrySummary> {
    let payload_bytes: i64 = row.get(4)?;
    Ok(EntrySummary {
        key: row.get(0)?,
        entity_type: entity_from_column(row, 1)?,
        customer_id: row.get(2)?,
        params: params_from_column(row, 3)?,
        payload_bytes: u64::try_from(payload_bytes).unwrap_or_default(),
        created_at: from_millis(5, row.get(5)?)?,
        expires_at: from_millis(6, row.get(6)?)?,
    })
}

/// SQLite-backed [`StorageBackend`]
pub struct SqliteBackend {
    pool: SqlitePool,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("pool_size", &status.size)
            .field("pool_max_size", &status.max_size)
            .finish()
    }
}

impl SqliteBackend {
    /// Build the pool. No connection is opened until [`initialize`](StorageBackend::initialize).
    pub fn new(config: &SqliteConfig, pool_wait: Duration) -> StorageResult<Self> {
        let pool = SqlitePool::builder(SqliteManager::new(config.path.clone()))
            .max_size(config.pool_size)
            .wait_timeout(Some(pool_wait))
            .create_timeout(Some(CREATE_TIMEOUT))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StorageError::init(BACKEND, e))?;

        Ok(Self {
            pool,
            path: config.path.clone(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, access: Access, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        tokio::task::spawn_blocking(move || f(&mut conn))
            .await
            .map_err(|e| access.error(e))?
            .map_err(|e| access.error(e))
    }

    /// Hold a pooled connection until the returned object is dropped
    #[cfg(test)]
    pub(crate) async fn checkout(&self) -> StorageResult<managed::Object<SqliteManager>> {
        self.pool.get().await.map_err(map_pool_error)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn initialize(&self) -> StorageResult<()> {
        let conn = self.pool.get().await.map_err(|e| match map_pool_error(e) {
            closed @ StorageError::Closed { .. } => closed,
            StorageError::Init { message, .. }
            | StorageError::Read { message, .. }
            | StorageError::Write { message, .. }
            | StorageError::PoolExhausted { message, .. } => StorageError::init(BACKEND, message),
            other => other,
        })?;

        tokio::task::spawn_blocking(move || conn.execute_batch(SCHEMA))
            .await
            .map_err(|e| StorageError::init(BACKEND, e))?
            .map_err(|e| StorageError::init(BACKEND, e))?;

        tracing::debug!(cache.backend = "sqlite", path = %self.path.display(), "Schema ready");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<CacheEntry>> {
        let key = key.to_string();
        self.with_conn(Access::Read, move |conn| {
            conn.query_row(SELECT_ENTRY, params![key], entry_from_row)
                .optional()
        })
        .await
    }

    async fn put(&self, entry: &CacheEntry) -> StorageResult<()> {
        let entry = entry.clone();
        self.with_conn(Access::Write, move |conn| {
            conn.execute(
                UPSERT_ENTRY,
                params![
                    entry.key,
                    entry.scope.entity_type.as_str(),
                    entry.scope.customer_id,
                    entry.scope.params.canonical(),
                    entry.payload,
                    to_millis(entry.created_at),
                    to_millis(entry.expires_at),
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let key = key.to_string();
        self.with_conn(Access::Write, move |conn| {
            conn.execute("DELETE FROM cache_entries WHERE cache_key = ?1", params![key])
                .map(|n| n > 0)
        })
        .await
    }

    async fn delete_by_scope(
        &self,
        entity_type: EntityType,
        customer_id: Option<&str>,
    ) -> StorageResult<u64> {
        let customer_id = customer_id.map(str::to_string);
        self.with_conn(Access::Write, move |conn| {
            conn.execute(
                "DELETE FROM cache_entries WHERE entity_type = ?1 \
                 AND (?2 IS NULL OR customer_id = ?2)",
                params![entity_type.as_str(), customer_id],
            )
            .map(|n| n as u64)
        })
        .await
    }

    async fn delete_by_customer(&self, customer_id: &str) -> StorageResult<u64> {
        let customer_id = customer_id.to_string();
        self.with_conn(Access::Write, move |conn| {
            conn.execute(
                "DELETE FROM cache_entries WHERE customer_id = ?1",
                params![customer_id],
            )
            .map(|n| n as u64)
        })
        .await
    }

    async fn clear_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        self.with_conn(Access::Write, move |conn| {
            conn.execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![to_millis(now)],
            )
            .map(|n| n as u64)
        })
        .await
    }

    async fn clear_all(&self) -> StorageResult<()> {
        self.with_conn(Access::Write, |conn| {
            conn.execute("DELETE FROM cache_entries", []).map(|_| ())
        })
        .await
    }

    async fn list_entries(&self, filter: &EntryFilter) -> StorageResult<Vec<EntrySummary>> {
        let entity_type = filter.entity_type.map(|e| e.as_str());
        let customer_id = filter.customer_id.clone();
        let limit = filter
            .limit
            .and_then(|l| i64::try_from(l).ok())
            .unwrap_or(-1);

        self.with_conn(Access::Read, move |conn| {
            let mut stmt = conn.prepare(LIST_ENTRIES)?;
            let rows = stmt.query_map(params![entity_type, customer_id, limit], summary_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn stats(&self, now: DateTime<Utc>) -> StorageResult<StorageStats> {
        self.with_conn(Access::Read, move |conn| {
            let (total, expired, bytes): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*), \
                 COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(LENGTH(CAST(payload AS BLOB))), 0) \
                 FROM cache_entries",
                params![to_millis(now)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let mut stmt = conn
                .prepare("SELECT entity_type, COUNT(*) FROM cache_entries GROUP BY entity_type")?;
            let mut entries_by_type = BTreeMap::new();
            for row in stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })? {
                let (name, count) = row?;
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
        })
        .await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.with_conn(Access::Read, |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
        })
        .await
    }

    async fn close(&self) {
        self.pool.close();
    }

    fn kind(&self) -> BackendKind {
        BACKEND
    }
}
