//! Persisted cache entry types

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::key::{CacheKey, EntityType, ScopeParams};

/// What a cached payload represents: entity type, account and filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeMetadata {
    pub entity_type: EntityType,
    pub customer_id: String,
    pub params: ScopeParams,
}

impl From<&CacheKey> for ScopeMetadata {
    fn from(key: &CacheKey) -> Self {
        Self {
            entity_type: key.entity_type(),
            customer_id: key.customer_id().to_string(),
            params: key.params().clone(),
        }
    }
}

/// A single stored cache entry.
///
/// `payload` is the serialized response body (JSON text). Timestamps are
/// always UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub scope: ScopeMetadata,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    #[must_use]
    pub fn new(
        key: &CacheKey,
        payload: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.as_str().to_string(),
            scope: ScopeMetadata::from(key),
            payload,
            created_at,
            expires_at,
        }
    }

    /// Whether the entry is past `expires_at` plus `grace` at `now`
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.expires_at
            .checked_add_signed(grace)
            .is_some_and(|limit| now > limit)
    }

    /// Whether `now` falls after `expires_at` but inside the grace window
    #[must_use]
    pub fn is_within_grace(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        now > self.expires_at && !self.is_stale(now, grace)
    }

    #[must_use]
    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            key: self.key.clone(),
            entity_type: self.scope.entity_type,
            customer_id: self.scope.customer_id.clone(),
            params: self.scope.params.clone(),
            payload_bytes: self.payload.len() as u64,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Entry listing row: scope metadata and timestamps without the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub key: String,
    pub entity_type: EntityType,
    pub customer_id: String,
    pub params: ScopeParams,
    pub payload_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Filter for [`list_entries`](super::StorageBackend::list_entries)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub entity_type: Option<EntityType>,
    pub customer_id: Option<String>,
    pub limit: Option<usize>,
}

impl EntryFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    #[must_use]
    pub fn customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_expiring_at(expires_at: DateTime<Utc>) -> CacheEntry {
        let key = CacheKey::new(EntityType::Campaign, "1234567890", ScopeParams::new());
        CacheEntry::new(
            &key,
            "[]".to_string(),
            expires_at - Duration::minutes(15),
            expires_at,
        )
    }

    #[test]
    fn test_entry_carries_scope_from_key() {
        let key = CacheKey::new(
            EntityType::Budget,
            "123-456-7890",
            ScopeParams::new().with("status", "ENABLED"),
        );
        let now = Utc::now();
        let entry = CacheEntry::new(&key, "{}".to_string(), now, now + Duration::minutes(5));

        assert_eq!(entry.key, key.as_str());
        assert_eq!(entry.scope.entity_type, EntityType::Budget);
        assert_eq!(entry.scope.customer_id, "1234567890");
        assert_eq!(entry.scope.params, *key.params());
    }

    #[test]
    fn test_staleness_boundaries() {
        let expires_at = Utc::now();
        let entry = entry_expiring_at(expires_at);
        let grace = Duration::minutes(4);

        assert!(!entry.is_stale(expires_at - Duration::seconds(1), grace));
        assert!(!entry.is_within_grace(expires_at - Duration::seconds(1), grace));

        assert!(!entry.is_stale(expires_at + Duration::minutes(2), grace));
        assert!(entry.is_within_grace(expires_at + Duration::minutes(2), grace));

        assert!(entry.is_stale(expires_at + Duration::minutes(4) + Duration::seconds(1), grace));
    }

    #[test]
    fn test_zero_grace_is_stale_right_after_expiry() {
        let expires_at = Utc::now();
        let entry = entry_expiring_at(expires_at);

        assert!(!entry.is_stale(expires_at, Duration::zero()));
        assert!(entry.is_stale(expires_at + Duration::milliseconds(1), Duration::zero()));
    }

    #[test]
    fn test_summary_omits_payload() {
        let entry = entry_expiring_at(Utc::now());
        let summary = entry.summary();

        assert_eq!(summary.key, entry.key);
        assert_eq!(summary.payload_bytes, 2);
        assert_eq!(summary.expires_at, entry.expires_at);
    }

    #[test]
    fn test_entry_filter_builder() {
        let filter = EntryFilter::new()
            .entity_type(EntityType::Keyword)
            .customer_id("1234567890")
            .limit(10);

        assert_eq!(filter.entity_type, Some(EntityType::Keyword));
        assert_eq!(filter.customer_id.as_deref(), Some("1234567890"));
        assert_eq!(filter.limit, Some(10));
    }
}
