//! Persistent response cache for the Google Ads MCP server

pub mod cache;
pub mod config;
mod error;
pub mod observability;
pub mod service;
pub mod validation;

pub use cache::{
    BackendKind, CacheConfig, CacheKey, CacheManager, CacheResult, CacheStats, CacheTtlConfig,
    CacheUnavailable, EntityType, ScopeParams, StorageBackend, StorageConfig, StorageError,
    create_cache_manager, get_storage_backend,
};
pub use config::{Config, ConfigBuilder, RuntimeConfig, RuntimeConfigHolder, TelemetryConfig};
pub use error::{Error, Result};
pub use service::{AdsApi, CachedAdsService, CustomerId, DateRange};
