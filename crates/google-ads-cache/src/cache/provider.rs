//! Storage backend trait definition

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::BackendKind;
use super::entry::{CacheEntry, EntryFilter, EntrySummary};
use super::error::StorageResult;
use super::key::EntityType;

/// Storage-level statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub total_entries: u64,
    /// Entries with `expires_at <= now`
    pub expired_entries: u64,
    pub entries_by_type: BTreeMap<EntityType, u64>,
    pub payload_bytes: u64,
}

/// Passive store for cache entries.
///
/// Implementors persist entries keyed by cache key and carry no cache
/// semantics (TTL, grace). Every method is a potential I/O suspension point.
/// After [`close`](Self::close) every operation fails with
/// [`StorageError::Closed`](super::StorageError::Closed).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create tables and indexes; idempotent
    async fn initialize(&self) -> StorageResult<()>;

    /// Get an entry by key; `None` on absence
    async fn get(&self, key: &str) -> StorageResult<Option<CacheEntry>>;

    /// Insert or replace an entry
    async fn put(&self, entry: &CacheEntry) -> StorageResult<()>;

    /// Delete one entry, returning whether it existed
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Delete every entry of `entity_type`, optionally limited to one customer
    async fn delete_by_scope(
        &self,
        entity_type: EntityType,
        customer_id: Option<&str>,
    ) -> StorageResult<u64>;

    /// Delete every entry for one customer across all entity types
    async fn delete_by_customer(&self, customer_id: &str) -> StorageResult<u64>;

    /// Remove all entries whose `expires_at <= now`
    async fn clear_expired(&self, now: DateTime<Utc>) -> StorageResult<u64>;

    /// Wipe all entries
    async fn clear_all(&self) -> StorageResult<()>;

    /// Entry summaries, newest first
    async fn list_entries(&self, filter: &EntryFilter) -> StorageResult<Vec<EntrySummary>>;

    async fn stats(&self, now: DateTime<Utc>) -> StorageResult<StorageStats>;

    /// Round-trip to the storage medium
    async fn health_check(&self) -> StorageResult<()>;

    /// Release pooled connections
    async fn close(&self);

    fn kind(&self) -> BackendKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_stats_default() {
        let stats = StorageStats::default();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.expired_entries, 0);
        assert!(stats.entries_by_type.is_empty());
        assert_eq!(stats.payload_bytes, 0);
    }

    #[test]
    fn test_storage_stats_serializes_entity_names() {
        let mut stats = StorageStats::default();
        stats.entries_by_type.insert(EntityType::AdGroup, 3);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["entries_by_type"]["ad_group"], 3);
    }
}
