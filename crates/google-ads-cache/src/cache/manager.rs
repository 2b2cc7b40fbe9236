//! Cache manager: hit/miss/stale decisions on top of a storage backend
//!
//! All timestamps come from the manager's [`Clock`] and are UTC. A read is a
//! hit while `now <= expires_at + grace`; a hit after `expires_at` counts as a
//! grace hit. Storage failures and timeouts surface as [`CacheUnavailable`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::clock::{Clock, SystemClock};
use super::config::{BackendKind, CacheConfig, DEFAULT_CLEANUP_INTERVAL, DEFAULT_OP_TIMEOUT};
use super::entry::{CacheEntry, EntryFilter, EntrySummary};
use super::error::{CacheResult, CacheUnavailable, StorageResult, UnavailableReason};
use super::key::{CacheKey, EntityType};
use super::provider::{StorageBackend, StorageStats};
use crate::validation::normalize_customer_id;

/// Smallest TTL applied to a write, so `expires_at > created_at` always holds
pub const MIN_TTL: Duration = Duration::from_secs(1);

/// Manager tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Upper bound for a single storage operation
    pub op_timeout: Duration,
    /// Opportunistic cleanup interval; `None` disables it
    pub cleanup_interval: Option<Duration>,
    /// Grace period honoured by cleanup: entries are kept until `expires_at + grace`
    pub grace: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            op_timeout: DEFAULT_OP_TIMEOUT,
            cleanup_interval: Some(DEFAULT_CLEANUP_INTERVAL),
            grace: Duration::ZERO,
        }
    }
}

impl From<&CacheConfig> for ManagerOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            op_timeout: config.op_timeout,
            cleanup_interval: config.cleanup_interval,
            grace: config.ttl.grace,
        }
    }
}

/// In-process cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Hits served after `expires_at` but inside the grace period (also counted in `hits`)
    pub grace_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
    pub invalidations: u64,
    /// Entries removed by cleanup runs
    pub cleaned: u64,
}

impl CacheStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    grace_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
    invalidations: AtomicU64,
    cleaned: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            grace_hits: self.grace_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            cleaned: self.cleaned.load(Ordering::Relaxed),
        }
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Latest `expires_at` that cleanup may remove at `now`
fn cleanup_cutoff(now: DateTime<Utc>, grace: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(to_delta(grace))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Run `fut` on the current runtime without awaiting it; no-op outside a runtime
fn spawn_detached<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(fut);
    }
}

/// Owns the lifecycle of cache entries on top of a [`StorageBackend`]
pub struct CacheManager<B> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    options: ManagerOptions,
    counters: Arc<Counters>,
    last_cleanup: Mutex<DateTime<Utc>>,
}

impl<B: StorageBackend> std::fmt::Debug for CacheManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backend", &self.backend.kind())
            .field("clock", &self.clock)
            .field("options", &self.options)
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

impl<B: StorageBackend + 'static> CacheManager<B> {
    pub fn new(backend: B, options: ManagerOptions) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            backend: Arc::new(backend),
            last_cleanup: Mutex::new(clock.now()),
            clock,
            options,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Replace the time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.last_cleanup = Mutex::new(clock.now());
        self.clock = clock;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub const fn options(&self) -> ManagerOptions {
        self.options
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Look up a payload.
    ///
    /// Returns `Ok(None)` on absence, on staleness (`now > expires_at + grace`)
    /// and on a payload that no longer deserializes. Stale and corrupt entries
    /// are deleted in the background.
    pub async fn get_or_none<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        grace: Duration,
    ) -> CacheResult<Option<T>> {
        self.maybe_schedule_cleanup();
        let entity_type = key.entity_type();

        let Some(entry) = self
            .guarded("get", Some(key.as_str()), self.backend.get(key.as_str()))
            .await?
        else {
            self.record_miss(entity_type);
            return Ok(None);
        };

        let now = self.clock.now();
        let grace = to_delta(grace);

        if entry.is_stale(now, grace) {
            tracing::debug!(
                cache.key = %key,
                cache.result = "stale",
                expires_at = %entry.expires_at,
            );
            self.schedule_delete(entry.key);
            self.record_miss(entity_type);
            return Ok(None);
        }

        let payload = match serde_json::from_str::<T>(&entry.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    cache.key = %key,
                    cache.result = "corrupt",
                    error = %e,
                    "Discarding undecodable cache payload",
                );
                self.schedule_delete(entry.key);
                self.record_miss(entity_type);
                return Ok(None);
            }
        };

        let within_grace = entry.is_within_grace(now, grace);
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        if within_grace {
            self.counters.grace_hits.fetch_add(1, Ordering::Relaxed);
        }
        #[cfg(feature = "metrics")]
        crate::observability::record_cache_hit(entity_type.as_str(), within_grace);
        tracing::debug!(cache.key = %key, cache.result = "hit", cache.grace = within_grace);

        Ok(Some(payload))
    }

    /// Serialize and store a payload under `key` for `ttl`.
    ///
    /// Scope metadata (entity type, customer id, parameters) comes from the key.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        payload: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        self.maybe_schedule_cleanup();

        let payload = serde_json::to_string(payload).map_err(|e| {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            CacheUnavailable::new("put", UnavailableReason::Serialization(e.to_string()))
        })?;

        let created_at = self.clock.now();
        let expires_at = created_at
            .checked_add_signed(to_delta(ttl.max(MIN_TTL)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheEntry::new(key, payload, created_at, expires_at);

        self.guarded("put", Some(key.as_str()), self.backend.put(&entry))
            .await?;

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::observability::record_cache_write(key.entity_type().as_str());
        Ok(())
    }

    /// Remove every entry of `entity_type` for one customer
    pub async fn invalidate_scope(
        &self,
        entity_type: EntityType,
        customer_id: &str,
    ) -> CacheResult<u64> {
        let customer_id = normalize_customer_id(customer_id);
        let removed = self
            .guarded(
                "delete_by_scope",
                None,
                self.backend.delete_by_scope(entity_type, Some(&customer_id)),
            )
            .await?;

        self.record_invalidation(entity_type.as_str(), removed);
        tracing::debug!(
            cache.entity_type = entity_type.as_str(),
            cache.customer_id = %customer_id,
            cache.removed = removed,
            "Cache scope invalidated",
        );
        Ok(removed)
    }

    /// Remove every entry of `entity_type` across all customers
    pub async fn invalidate_entity_type(&self, entity_type: EntityType) -> CacheResult<u64> {
        let removed = self
            .guarded(
                "delete_by_scope",
                None,
                self.backend.delete_by_scope(entity_type, None),
            )
            .await?;
        self.record_invalidation(entity_type.as_str(), removed);
        Ok(removed)
    }

    /// Remove every entry for one customer across all entity types
    pub async fn invalidate_customer(&self, customer_id: &str) -> CacheResult<u64> {
        let customer_id = normalize_customer_id(customer_id);
        let removed = self
            .guarded(
                "delete_by_customer",
                None,
                self.backend.delete_by_customer(&customer_id),
            )
            .await?;
        self.record_invalidation("all", removed);
        Ok(removed)
    }

    pub async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        self.guarded("delete", Some(key.as_str()), self.backend.delete(key.as_str()))
            .await
    }

    pub async fn clear_all(&self) -> CacheResult<()> {
        self.guarded("clear_all", None, self.backend.clear_all())
            .await?;
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(cache.backend = self.kind().as_str(), "Cache cleared");
        Ok(())
    }

    /// Remove every entry with `expires_at + grace <= now`.
    ///
    /// Entries still inside the configured grace period are kept, so a read
    /// that would be a grace hit never races a cleanup pass.
    pub async fn run_cleanup(&self) -> CacheResult<u64> {
        let now = self.clock.now();
        let cutoff = cleanup_cutoff(now, self.options.grace);
        let removed = self
            .guarded("clear_expired", None, self.backend.clear_expired(cutoff))
            .await?;

        *self.last_cleanup.lock() = now;
        self.counters.cleaned.fetch_add(removed, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::observability::record_cache_cleanup(removed);

        if removed > 0 {
            tracing::info!(cache.removed = removed, "Expired cache entries removed");
        }
        Ok(removed)
    }

    pub async fn list_entries(&self, filter: &EntryFilter) -> CacheResult<Vec<EntrySummary>> {
        let mut filter = filter.clone();
        filter.customer_id = filter.customer_id.as_deref().map(normalize_customer_id);
        self.guarded("list_entries", None, self.backend.list_entries(&filter))
            .await
    }

    pub async fn storage_stats(&self) -> CacheResult<StorageStats> {
        let now = self.clock.now();
        self.guarded("stats", None, self.backend.stats(now)).await
    }

    pub async fn health_check(&self) -> CacheResult<()> {
        self.guarded("health_check", None, self.backend.health_check())
            .await
    }

    /// Snapshot of the in-process counters
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }

    /// Run [`run_cleanup`](Self::run_cleanup) every `interval` until the manager is dropped
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                // Failures are already logged by the storage guard.
                let _ = manager.run_cleanup().await;
            }
        })
    }

    async fn guarded<T, F>(
        &self,
        operation: &'static str,
        key: Option<&str>,
        fut: F,
    ) -> CacheResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        let err = match tokio::time::timeout(self.options.op_timeout, fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => CacheUnavailable::new(operation, e),
            Err(_) => CacheUnavailable::new(
                operation,
                UnavailableReason::Timeout(self.options.op_timeout),
            ),
        };

        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::observability::record_cache_error(operation);
        tracing::warn!(
            cache.operation = operation,
            cache.key = key,
            cache.backend = self.kind().as_str(),
            error = %err,
            "Cache unavailable",
        );
        Err(err)
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_miss(&self, entity_type: EntityType) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::observability::record_cache_miss(entity_type.as_str());
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_invalidation(&self, scope: &str, removed: u64) {
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        crate::observability::record_cache_invalidation(scope, removed);
    }

    fn schedule_delete(&self, key: String) {
        let backend = Arc::clone(&self.backend);
        let timeout = self.options.op_timeout;

        spawn_detached(async move {
            match tokio::time::timeout(timeout, backend.delete(&key)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::debug!(cache.key = %key, error = %e, "Stale entry delete failed"),
                Err(_) => tracing::debug!(cache.key = %key, "Stale entry delete timed out"),
            }
        });
    }

    fn maybe_schedule_cleanup(&self) {
        let Some(interval) = self.options.cleanup_interval else {
            return;
        };
        let now = self.clock.now();
        {
            let mut last = self.last_cleanup.lock();
            if now.signed_duration_since(*last) < to_delta(interval) {
                return;
            }
            *last = now;
        }

        let backend = Arc::clone(&self.backend);
        let counters = Arc::clone(&self.counters);
        let timeout = self.options.op_timeout;
        let cutoff = cleanup_cutoff(now, self.options.grace);

        spawn_detached(async move {
            match tokio::time::timeout(timeout, backend.clear_expired(cutoff)).await {
                Ok(Ok(removed)) => {
                    counters.cleaned.fetch_add(removed, Ordering::Relaxed);
                    #[cfg(feature = "metrics")]
                    crate::observability::record_cache_cleanup(removed);
                    tracing::debug!(cache.removed = removed, "Opportunistic cleanup finished");
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "Opportunistic cleanup failed"),
                Err(_) => tracing::warn!("Opportunistic cleanup timed out"),
            }
        });
    }
}
