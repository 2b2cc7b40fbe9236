//! Closed set of storage backends selected once at startup

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::config::BackendKind;
use super::entry::{CacheEntry, EntryFilter, EntrySummary};
use super::error::StorageResult;
use super::key::EntityType;
use super::postgres::PostgresBackend;
use super::provider::{StorageBackend, StorageStats};
use super::sqlite::SqliteBackend;

/// The configured storage backend
#[derive(Debug)]
pub enum Backend {
    Sqlite(SqliteBackend),
    Postgres(PostgresBackend),
}

impl From<SqliteBackend> for Backend {
    fn from(backend: SqliteBackend) -> Self {
        Self::Sqlite(backend)
    }
}

impl From<PostgresBackend> for Backend {
    fn from(backend: PostgresBackend) -> Self {
        Self::Postgres(backend)
    }
}

macro_rules! dispatch {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            Self::Sqlite($backend) => $call,
            Self::Postgres($backend) => $call,
        }
    };
}

#[async_trait]
impl StorageBackend for Backend {
    async fn initialize(&self) -> StorageResult<()> {
        dispatch!(self, b => b.initialize().await)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<CacheEntry>> {
        dispatch!(self, b => b.get(key).await)
    }

    async fn put(&self, entry: &CacheEntry) -> StorageResult<()> {
        dispatch!(self, b => b.put(entry).await)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        dispatch!(self, b => b.delete(key).await)
    }

    async fn delete_by_scope(
        &self,
        entity_type: EntityType,
        customer_id: Option<&str>,
    ) -> StorageResult<u64> {
        dispatch!(self, b => b.delete_by_scope(entity_type, customer_id).await)
    }

    async fn delete_by_customer(&self, customer_id: &str) -> StorageResult<u64> {
        dispatch!(self, b => b.delete_by_customer(customer_id).await)
    }

    async fn clear_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        dispatch!(self, b => b.clear_expired(now).await)
    }

    async fn clear_all(&self) -> StorageResult<()> {
        dispatch!(self, b => b.clear_all().await)
    }

    async fn list_entries(&self, filter: &EntryFilter) -> StorageResult<Vec<EntrySummary>> {
        dispatch!(self, b => b.list_entries(filter).await)
    }

    async fn stats(&self, now: DateTime<Utc>) -> StorageResult<StorageStats> {
        dispatch!(self, b => b.stats(now).await)
    }

    async fn health_check(&self) -> StorageResult<()> {
        dispatch!(self, b => b.health_check().await)
    }

    async fn close(&self) {
        dispatch!(self, b => b.close().await);
    }

    fn kind(&self) -> BackendKind {
        dispatch!(self, b => b.kind())
    }
}
