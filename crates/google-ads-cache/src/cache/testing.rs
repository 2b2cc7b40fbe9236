//! Fault-injecting storage backend for tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::config::BackendKind;
use super::entry::{CacheEntry, EntryFilter, EntrySummary};
use super::error::{StorageError, StorageResult};
use super::key::EntityType;
use super::provider::{StorageBackend, StorageStats};

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Every operation fails immediately with a read error
    Fail,
    /// Every operation sleeps for the given duration first
    Hang(Duration),
}

#[derive(Debug)]
pub struct FaultyBackend {
    fault: Fault,
    calls: AtomicU64,
}

impl FaultyBackend {
    pub const fn new(fault: Fault) -> Self {
        Self {
            fault,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn fault<T>(&self) -> StorageResult<T> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Fault::Hang(delay) = self.fault {
            tokio::time::sleep(delay).await;
        }
        Err(StorageError::read(BackendKind::Sqlite, "simulated I/O failure"))
    }
}

#[async_trait]
impl StorageBackend for FaultyBackend {
    async fn initialize(&self) -> StorageResult<()> {
        self.fault().await
    }

    async fn get(&self, _key: &str) -> StorageResult<Option<CacheEntry>> {
        self.fault().await
    }

    async fn put(&self, _entry: &CacheEntry) -> StorageResult<()> {
        self.fault().await
    }

    async fn delete(&self, _key: &str) -> StorageResult<bool> {
        self.fault().await
    }

    async fn delete_by_scope(
        &self,
        _entity_type: EntityType,
        _customer_id: Option<&str>,
    ) -> StorageResult<u64> {
        self.fault().await
    }

    async fn delete_by_customer(&self, _customer_id: &str) -> StorageResult<u64> {
        self.fault().await
    }

    async fn clear_expired(&self, _now: DateTime<Utc>) -> StorageResult<u64> {
        self.fault().await
    }

    async fn clear_all(&self) -> StorageResult<()> {
        self.fault().await
    }

    async fn list_entries(&self, _filter: &EntryFilter) -> StorageResult<Vec<EntrySummary>> {
        self.fault().await
    }

    async fn stats(&self, _now: DateTime<Utc>) -> StorageResult<StorageStats> {
        self.fault().await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.fault().await
    }

    async fn close(&self) {}

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }
}
