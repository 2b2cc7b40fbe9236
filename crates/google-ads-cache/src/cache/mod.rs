//! Persistent TTL cache for Google Ads API responses
//!
//! Entries are addressed by deterministic keys derived from the entity type,
//! the customer id and the request's scope parameters, and stored by one of
//! two backends selected once at startup.
//!
//! # Available Backends
//!
//! - [`SqliteBackend`] - embedded file database (default)
//! - [`PostgresBackend`] - networked database shared by several processes
//!
//! Both persist a single `cache_entries` table with the scope metadata
//! (`entity_type`, `customer_id`, `scope_params`) next to the payload, so
//! scoped invalidation never has to decode payloads.
//!
//! # Expiration
//!
//! [`CacheManager`] treats an entry as a hit while `now <= expires_at + grace`.
//! All timestamps are UTC. Expired entries are removed by
//! [`CacheManager::run_cleanup`], which also runs opportunistically once per
//! cleanup interval and from [`CacheManager::spawn_cleanup_task`].
//!
//! # Failure Semantics
//!
//! Storage errors and timeouts surface as [`CacheUnavailable`]; callers treat
//! them as a miss. Only startup errors ([`StorageError::Init`],
//! [`StorageError::UnsupportedBackend`]) are fatal.
//!
//! # Observability
//!
//! The factory wraps the backend in [`TracedBackend`], which emits a debug
//! span per storage operation.

mod backend;
mod clock;
mod config;
mod entry;
mod error;
mod factory;
mod key;
mod manager;
mod postgres;
mod provider;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;
mod traced;

pub use backend::Backend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BackendKind, CacheConfig, CacheTtlConfig, DEFAULT_CLEANUP_INTERVAL, DEFAULT_OP_TIMEOUT,
    DEFAULT_POOL_WAIT, DEFAULT_POSTGRES_POOL_SIZE, DEFAULT_POSTGRES_PORT, DEFAULT_SQLITE_PATH,
    DEFAULT_SQLITE_POOL_SIZE, DEFAULT_TTL, PostgresConfig, SqliteConfig, SslMode, StorageConfig,
};
pub use entry::{CacheEntry, EntryFilter, EntrySummary, ScopeMetadata};
pub use error::{CacheResult, CacheUnavailable, StorageError, StorageResult, UnavailableReason};
pub use factory::{
    ConfiguredBackend, ConfiguredManager, create_cache_manager, get_storage_backend,
    get_storage_backend_named,
};
pub use key::{
    CacheKey, EntityType, KeyError, ScopeParams, ScopeValue, VISUALIZATION_SUBTYPE_PARAM,
    build_key,
};
pub use manager::{CacheManager, CacheStats, MIN_TTL, ManagerOptions};
pub use postgres::PostgresBackend;
pub use provider::{StorageBackend, StorageStats};
pub use sqlite::SqliteBackend;
pub use traced::TracedBackend;
