//! Read-through cache in front of an [`AdsApi`]

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::AdsApi;
use super::types::{
    AccountSummary, AdGroup, AdGroupFilter, Budget, BudgetFilter, BudgetUpdate, Campaign,
    CustomerId, DateRange, EntityStatus, Keyword, KeywordFilter, SearchTerm, SearchTermFilter,
};
use crate::cache::{
    CacheKey, CacheManager, ConfiguredBackend, EntityType, ScopeParams, StorageBackend,
};
use crate::config::RuntimeConfigHolder;

/// Entity types invalidated after a budget mutation
const BUDGET_SCOPES: &[EntityType] = &[EntityType::Budget, EntityType::Visualization];

/// Entity types invalidated after a keyword mutation
const KEYWORD_SCOPES: &[EntityType] = &[EntityType::Keyword, EntityType::Visualization];

/// Google Ads service with a read-through cache.
///
/// Reads try the cache first and fall back to the API on a miss or when the
/// cache is unavailable; fetched results are stored best-effort. Remote
/// errors are returned unchanged and never cached. Without a manager every
/// call goes straight to the API.
///
/// Every mutation bumps a generation counter for the scopes it invalidates.
/// A read that overlapped a mutation of its scope does not keep its result in
/// the cache, so the first read that starts after a mutation returns
/// observes it.
pub struct CachedAdsService<A, B = ConfiguredBackend> {
    api: A,
    cache: Option<Arc<CacheManager<B>>>,
    runtime: Arc<RuntimeConfigHolder>,
    generations: Mutex<BTreeMap<(EntityType, String), u64>>,
}

impl<A: fmt::Debug, B: StorageBackend> fmt::Debug for CachedAdsService<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedAdsService")
            .field("api", &self.api)
            .field("cache", &self.cache)
            .field("runtime", &self.runtime)
            .field("generations", &self.generations.lock().len())
            .finish()
    }
}

impl<A, B> CachedAdsService<A, B>
where
    A: AdsApi,
    B: StorageBackend + 'static,
{
    pub const fn new(
        api: A,
        cache: Option<Arc<CacheManager<B>>>,
        runtime: Arc<RuntimeConfigHolder>,
    ) -> Self {
        Self {
            api,
            cache,
            runtime,
            generations: Mutex::new(BTreeMap::new()),
        }
    }

    pub const fn api(&self) -> &A {
        &self.api
    }

    pub const fn cache(&self) -> Option<&Arc<CacheManager<B>>> {
        self.cache.as_ref()
    }

    pub fn runtime(&self) -> &RuntimeConfigHolder {
        &self.runtime
    }

    /// Return the cached value for `key` or run `fetch` and cache its result
    /// for `ttl`.
    pub async fn cached<T, E, F, Fut>(&self, key: &CacheKey, ttl: Duration, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let Some(cache) = &self.cache else {
            return fetch_remote(key, fetch).await;
        };

        let generation = self.generation(key);
        match cache.get_or_none::<T>(key, self.runtime.grace()).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(cache.key = %key, error = %e, "Cache bypassed");
            }
        }

        let value = fetch_remote(key, fetch).await?;

        if self.generation(key) != generation {
            tracing::debug!(cache.key = %key, "Scope mutated during fetch, result not cached");
            return Ok(value);
        }
        if let Err(e) = cache.put(key, &value, ttl).await {
            tracing::debug!(cache.key = %key, error = %e, "Fetched result not cached");
            return Ok(value);
        }
        // A mutation may have invalidated the scope between the check and the write.
        if self.generation(key) != generation
            && let Err(e) = cache.delete(key).await
        {
            tracing::warn!(cache.key = %key, error = %e, "Stale result could not be removed");
        }
        Ok(value)
    }

    fn generation(&self, key: &CacheKey) -> u64 {
        self.generations
            .lock()
            .get(&(key.entity_type(), key.customer_id().to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn bump_generations(&self, customer_id: &CustomerId, entity_types: &[EntityType]) {
        let mut generations = self.generations.lock();
        for &entity_type in entity_types {
            *generations
                .entry((entity_type, customer_id.as_str().to_string()))
                .or_insert(0) += 1;
        }
    }

    async fn cached_scope<T, F, Fut>(
        &self,
        entity_type: EntityType,
        customer_id: &CustomerId,
        params: ScopeParams,
        fetch: F,
    ) -> Result<T, A::Error>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, A::Error>> + Send,
    {
        let key = CacheKey::new(entity_type, customer_id.as_str(), params);
        let ttl = self.runtime.ttl_for(entity_type);
        self.cached(&key, ttl, fetch).await
    }

    /// Account-level KPIs for a date range
    pub async fn get_account_summary(
        &self,
        customer_id: &CustomerId,
        date_range: DateRange,
    ) -> Result<AccountSummary, A::Error> {
        let params = ScopeParams::new().with_date_range(date_range.start(), date_range.end());
        self.cached_scope(EntityType::AccountKpi, customer_id, params, || {
            self.api.account_summary(customer_id, date_range)
        })
        .await
    }

    pub async fn get_campaigns(
        &self,
        customer_id: &CustomerId,
        date_range: DateRange,
    ) -> Result<Vec<Campaign>, A::Error> {
        let params = ScopeParams::new().with_date_range(date_range.start(), date_range.end());
        self.cached_scope(EntityType::Campaign, customer_id, params, || {
            self.api.campaigns(customer_id, date_range)
        })
        .await
    }

    pub async fn get_ad_groups(
        &self,
        customer_id: &CustomerId,
        filter: &AdGroupFilter,
    ) -> Result<Vec<AdGroup>, A::Error> {
        self.cached_scope(EntityType::AdGroup, customer_id, filter.scope(), || {
            self.api.ad_groups(customer_id, filter)
        })
        .await
    }

    pub async fn get_keywords(
        &self,
        customer_id: &CustomerId,
        filter: &KeywordFilter,
    ) -> Result<Vec<Keyword>, A::Error> {
        self.cached_scope(EntityType::Keyword, customer_id, filter.scope(), || {
            self.api.keywords(customer_id, filter)
        })
        .await
    }

    pub async fn get_budgets(
        &self,
        customer_id: &CustomerId,
        filter: &BudgetFilter,
    ) -> Result<Vec<Budget>, A::Error> {
        self.cached_scope(EntityType::Budget, customer_id, filter.scope(), || {
            self.api.budgets(customer_id, filter)
        })
        .await
    }

    pub async fn get_search_terms(
        &self,
        customer_id: &CustomerId,
        filter: &SearchTermFilter,
    ) -> Result<Vec<SearchTerm>, A::Error> {
        self.cached_scope(EntityType::SearchTerm, customer_id, filter.scope(), || {
            self.api.search_terms(customer_id, filter)
        })
        .await
    }

    /// Cached visualization payload of `subtype` (e.g. `time_series`).
    ///
    /// `build` produces the payload on a miss, usually from other reads of
    /// this service.
    pub async fn get_visualization<T, E, F, Fut>(
        &self,
        customer_id: &CustomerId,
        subtype: &str,
        params: ScopeParams,
        build: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let key = CacheKey::visualization(customer_id.as_str(), subtype, params);
        let ttl = self.runtime.ttl_for(EntityType::Visualization);
        self.cached(&key, ttl, build).await
    }

    pub async fn update_campaign_budget(
        &self,
        customer_id: &CustomerId,
        update: &BudgetUpdate,
    ) -> Result<Budget, A::Error> {
        let budget = self.api.update_budget(customer_id, update).await?;
        self.invalidate(customer_id, BUDGET_SCOPES).await;
        Ok(budget)
    }

    pub async fn update_campaign_budgets_batch(
        &self,
        customer_id: &CustomerId,
        updates: &[BudgetUpdate],
    ) -> Result<Vec<Budget>, A::Error> {
        let budgets = self.api.update_budgets(customer_id, updates).await?;
        self.invalidate(customer_id, BUDGET_SCOPES).await;
        Ok(budgets)
    }

    pub async fn update_keyword_status(
        &self,
        customer_id: &CustomerId,
        keyword_id: &str,
        status: EntityStatus,
    ) -> Result<Keyword, A::Error> {
        let keyword = self
            .api
            .update_keyword_status(customer_id, keyword_id, status)
            .await?;
        self.invalidate(customer_id, KEYWORD_SCOPES).await;
        Ok(keyword)
    }

    /// Drop cached reads made stale by a successful mutation.
    ///
    /// The mutation already happened, so a failure here is logged and the
    /// caller still gets its result.
    async fn invalidate(&self, customer_id: &CustomerId, entity_types: &[EntityType]) {
        let Some(cache) = &self.cache else {
            return;
        };
        self.bump_generations(customer_id, entity_types);

        for &entity_type in entity_types {
            if let Err(e) = cache.invalidate_scope(entity_type, customer_id.as_str()).await {
                tracing::error!(
                    cache.entity_type = entity_type.as_str(),
                    customer_id = %customer_id,
                    error = %e,
                    "Cache invalidation failed after mutation",
                );
            }
        }
    }
}

async fn fetch_remote<T, E, F, Fut>(key: &CacheKey, fetch: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    #[cfg(feature = "metrics")]
    crate::observability::record_remote_fetch(key.entity_type().as_str());
    tracing::debug!(cache.key = %key, "Fetching from Google Ads API");
    fetch().await
}
