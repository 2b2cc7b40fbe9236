//! Traced storage wrapper for observability

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::Instrument;

use super::config::BackendKind;
use super::entry::{CacheEntry, EntryFilter, EntrySummary};
use super::error::StorageResult;
use super::key::EntityType;
use super::provider::{StorageBackend, StorageStats};

/// Wrapper that adds tracing to any [`StorageBackend`]
///
/// Uses debug-level spans since cache keys carry customer ids.
/// Failures are logged at `warn` with key, operation and backend.
#[derive(Debug, Clone)]
pub struct TracedBackend<B> {
    inner: B,
}

impl<B> TracedBackend<B> {
    pub const fn new(backend: B) -> Self {
        Self { inner: backend }
    }

    pub const fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for TracedBackend<B> {
    async fn initialize(&self) -> StorageResult<()> {
        let backend = self.inner.kind();
        let span = tracing::debug_span!(
            "cache.initialize",
            cache.backend = backend.as_str(),
            otel.name = "cache.initialize",
        );

        let result = self.inner.initialize().instrument(span).await;

        match &result {
            Ok(()) => tracing::info!(cache.backend = backend.as_str(), "Cache storage initialized"),
            Err(e) => tracing::error!(
                cache.operation = "initialize",
                cache.backend = backend.as_str(),
                error = %e,
            ),
        }

        result
    }

    async fn get(&self, key: &str) -> StorageResult<Option<CacheEntry>> {
        let backend = self.inner.kind();
        let span = tracing::debug_span!(
            "cache.get",
            cache.key = key,
            cache.backend = backend.as_str(),
            otel.name = "cache.get",
        );

        let result = self.inner.get(key).instrument(span).await;

        match &result {
            Ok(Some(entry)) => {
                tracing::debug!(
                    cache.result = "found",
                    cache.key = key,
                    cache.size_bytes = entry.payload.len(),
                );
            }
            Ok(None) => {
                tracing::debug!(cache.result = "absent", cache.key = key);
            }
            Err(e) => {
                tracing::warn!(
                    cache.result = "error",
                    cache.operation = "get",
                    cache.key = key,
                    cache.backend = backend.as_str(),
                    error = %e,
                );
            }
        }

        result
    }

    async fn put(&self, entry: &CacheEntry) -> StorageResult<()> {
        let backend = self.inner.kind();
        let span = tracing::debug_span!(
            "cache.put",
            cache.key = %entry.key,
            cache.entity_type = entry.scope.entity_type.as_str(),
            cache.backend = backend.as_str(),
            cache.value_size = entry.payload.len(),
            otel.name = "cache.put",
        );

        let result = self.inner.put(entry).instrument(span).await;

        if let Err(ref e) = result {
            tracing::warn!(
                cache.operation = "put",
                cache.key = %entry.key,
                cache.backend = backend.as_str(),
                error = %e,
            );
        }

        result
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let backend = self.inner.kind();
        let span = tracing::debug_span!(
            "cache.delete",
            cache.key = key,
            cache.backend = backend.as_str(),
            otel.name = "cache.delete",
        );

        let result = self.inner.delete(key).instrument(span).await;

        match &result {
            Ok(deleted) => {
                tracing::debug!(cache.operation = "delete", cache.key = key, cache.deleted = deleted);
            }
            Err(e) => {
                tracing::warn!(
                    cache.operation = "delete",
                    cache.key = key,
                    cache.backend = backend.as_str(),
                    error = %e,
                );
            }
        }

        result
    }

    async fn delete_by_scope(
        &self,
        entity_type: EntityType,
        customer_id: Option<&str>,
    ) -> StorageResult<u64> {
        let backend = self.inner.kind();
        let span = tracing::debug_span!(
            "cache.delete_by_scope",
            cache.entity_type = entity_type.as_str(),
            cache.customer_id = customer_id,
            cache.backend = backend.as_str(),
            otel.name = "cache.delete_by_scope",
        );

        let result = self
            .inner
            .delete_by_scope(entity_type, customer_id)
            .instrument(span)
            .await;

        match &result {
            Ok(count) => {
                tracing::debug!(
                    cache.operation = "delete_by_scope",
                    cache.entity_type = entity_type.as_str(),
                    cache.deleted_count = count,
                );
            }
            Err(e) => {
                tracing::warn!(
                    cache.operation = "delete_by_scope",
                    cache.entity_type = entity_type.as_str(),
                    cache.backend = backend.as_str(),
                    error = %e,
                );
            }
        }

        result
    }

    async fn delete_by_customer(&self, customer_id: &str) -> StorageResult<u64> {
        let backend = self.inner.kind();
        let span = tracing::debug_span!(
            "cache.delete_by_customer",
            cache.customer_id = customer_id,
            cache.backend = backend.as_str(),
            otel.name = "cache.delete_by_customer",
        );

        let result = self.inner.delete_by_customer(customer_id).instrument(span).await;

        if let Err(ref e) = result {
            tracing::warn!(
                cache.operation = "delete_by_customer",
                cache.backend = backend.as_str(),
                error = %e,
            );
        }

        result
    }

    async fn clear_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let backend = self.inner.kind();
        let span = tracing::debug_span!(
            "cache.clear_expired",
            cache.backend = backend.as_str(),
            otel.name = "cache.clear_expired",
        );

        let result = self.inner.clear_expired(now).instrument(span).await;

        match &result {
            Ok(count) => tracing::debug!(cache.operation = "clear_expired", cache.deleted_count = count),
            Err(e) => tracing::warn!(
                cache.operation = "clear_expired",
                cache.backend = backend.as_str(),
                error = %e,
            ),
        }

        result
    }

    async fn clear_all(&self) -> StorageResult<()> {
        let backend = self.inner.kind();
        let span = tracing::debug_span!(
            "cache.clear_all",
            cache.backend = backend.as_str(),
            otel.name = "cache.clear_all",
        );

        let result = self.inner.clear_all().instrument(span).await;

        if let Err(ref e) = result {
            tracing::warn!(cache.operation = "clear_all", cache.backend = backend.as_str(), error = %e);
        }

        result
    }

    async fn list_entries(&self, filter: &EntryFilter) -> StorageResult<Vec<EntrySummary>> {
        let span = tracing::debug_span!(
            "cache.list_entries",
            cache.backend = self.inner.kind().as_str(),
            otel.name = "cache.list_entries",
        );

        self.inner.list_entries(filter).instrument(span).await
    }

    async fn stats(&self, now: DateTime<Utc>) -> StorageResult<StorageStats> {
        let span = tracing::debug_span!(
            "cache.stats",
            cache.backend = self.inner.kind().as_str(),
            otel.name = "cache.stats",
        );

        self.inner.stats(now).instrument(span).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        let span = tracing::debug_span!(
            "cache.health_check",
            cache.backend = self.inner.kind().as_str(),
            otel.name = "cache.health_check",
        );

        self.inner.health_check().instrument(span).await
    }

    async fn close(&self) {
        self.inner.close().await;
        tracing::debug!(cache.backend = self.inner.kind().as_str(), "Cache storage closed");
    }

    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }
}
