//! Backend construction from configuration

use std::sync::Arc;

use super::backend::Backend;
use super::config::{BackendKind, CacheConfig, PostgresConfig, StorageConfig};
use super::error::{StorageError, StorageResult};
use super::manager::{CacheManager, ManagerOptions};
use super::postgres::PostgresBackend;
use super::provider::StorageBackend;
use super::sqlite::SqliteBackend;
use super::traced::TracedBackend;

/// Backend type produced by the factory
pub type ConfiguredBackend = TracedBackend<Backend>;

/// Manager type produced by the factory
pub type ConfiguredManager = CacheManager<ConfiguredBackend>;

fn check_postgres(config: &PostgresConfig) -> StorageResult<()> {
    let missing: Vec<&str> = [
        ("host", config.host.is_empty()),
        ("database", config.database.is_empty()),
        ("user", config.user.is_empty()),
    ]
    .into_iter()
    .filter_map(|(name, empty)| empty.then_some(name))
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StorageError::init(
            BackendKind::Postgres,
            format!("missing connection parameters: {}", missing.join(", ")),
        ))
    }
}

/// Construct and initialize the configured storage backend.
///
/// Fails with [`StorageError::Init`] when the backend cannot be reached or
/// its schema cannot be created. There is no fallback to another backend.
pub async fn get_storage_backend(config: &StorageConfig) -> StorageResult<ConfiguredBackend> {
    let backend: Backend = match config.backend {
        BackendKind::Sqlite => SqliteBackend::new(&config.sqlite, config.pool_wait)?.into(),
        BackendKind::Postgres => {
            check_postgres(&config.postgres)?;
            PostgresBackend::new(&config.postgres, config.pool_wait)?.into()
        }
    };

    let backend = TracedBackend::new(backend);
    backend.initialize().await?;
    Ok(backend)
}

/// Same as [`get_storage_backend`] with the backend named by a string
/// (`sqlite`, `postgres`, ...); unknown names fail with
/// [`StorageError::UnsupportedBackend`].
pub async fn get_storage_backend_named(
    backend_type: &str,
    config: &StorageConfig,
) -> StorageResult<ConfiguredBackend> {
    let config = StorageConfig {
        backend: backend_type.parse()?,
        ..config.clone()
    };
    get_storage_backend(&config).await
}

/// Build the cache manager, or `None` when caching is disabled
pub async fn create_cache_manager(
    config: &CacheConfig,
) -> StorageResult<Option<Arc<ConfiguredManager>>> {
    if !config.enabled {
        tracing::info!("Caching disabled");
        return Ok(None);
    }

    let backend = get_storage_backend(&config.storage).await?;
    tracing::info!(
        cache.backend = backend.kind().as_str(),
        ttl_secs = config.ttl.default.as_secs(),
        grace_secs = config.ttl.grace.as_secs(),
        "Cache manager ready"
    );
    Ok(Some(Arc::new(CacheManager::new(
        backend,
        ManagerOptions::from(config),
    ))))
}
