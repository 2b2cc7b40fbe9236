//! Cache-aware access to the Google Ads API
//!
//! [`AdsApi`] is the remote collaborator; [`CachedAdsService`] answers reads
//! from the cache when it can and invalidates the affected scopes after
//! every successful mutation.

mod cached;
mod types;

use async_trait::async_trait;

pub use cached::CachedAdsService;
pub use types::{
    AccountSummary, AdGroup, AdGroupFilter, Budget, BudgetFilter, BudgetUpdate, Campaign,
    CustomerId, DateRange, EntityStatus, Keyword, KeywordFilter, Metrics, SearchTerm,
    SearchTermFilter,
};

/// Remote Google Ads API client.
///
/// Errors are owned by the implementation and reach callers of
/// [`CachedAdsService`] unchanged.
#[async_trait]
pub trait AdsApi: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn account_summary(
        &self,
        customer_id: &CustomerId,
        date_range: DateRange,
    ) -> Result<AccountSummary, Self::Error>;

    async fn campaigns(
        &self,
        customer_id: &CustomerId,
        date_range: DateRange,
    ) -> Result<Vec<Campaign>, Self::Error>;

    async fn ad_groups(
        &self,
        customer_id: &CustomerId,
        filter: &AdGroupFilter,
    ) -> Result<Vec<AdGroup>, Self::Error>;

    async fn keywords(
        &self,
        customer_id: &CustomerId,
        filter: &KeywordFilter,
    ) -> Result<Vec<Keyword>, Self::Error>;

    async fn budgets(
        &self,
        customer_id: &CustomerId,
        filter: &BudgetFilter,
    ) -> Result<Vec<Budget>, Self::Error>;

    async fn search_terms(
        &self,
        customer_id: &CustomerId,
        filter: &SearchTermFilter,
    ) -> Result<Vec<SearchTerm>, Self::Error>;

    async fn update_budget(
        &self,
        customer_id: &CustomerId,
        update: &BudgetUpdate,
    ) -> Result<Budget, Self::Error>;

    /// Apply several budget updates in one remote batch
    async fn update_budgets(
        &self,
        customer_id: &CustomerId,
        updates: &[BudgetUpdate],
    ) -> Result<Vec<Budget>, Self::Error>;

    async fn update_keyword_status(
        &self,
        customer_id: &CustomerId,
        keyword_id: &str,
        status: EntityStatus,
    ) -> Result<Keyword, Self::Error>;
}
