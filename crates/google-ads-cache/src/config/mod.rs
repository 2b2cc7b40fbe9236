//! Configuration management
//!
//! Supports configuration loading with precedence: env > file > CLI > defaults

mod builder;
mod env;
mod file;
mod runtime;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
#[cfg(unix)]
use tokio::task::JoinHandle;

pub use builder::{Config, ConfigBuilder, TelemetryConfig};
pub use runtime::{ReloadResult, ReloadTrigger, RuntimeConfig, RuntimeConfigHolder};

use crate::Result;

/// Load configuration with precedence: env > file > `builder`
pub fn load_config(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    // Load from config file if exists
    if let Some(path) = file::find_config_file() {
        tracing::info!("Loading configuration from {}", path.display());
        builder = file::load_from_file(&path, builder)?;
    }

    // Override with environment variables
    env::load_from_env(builder)
}

/// Load configuration from a specific file path
pub fn load_config_from_path(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let builder = file::load_from_file(path, builder)?;
    env::load_from_env(builder)
}

/// Re-read file and environment and swap the reloadable settings into
/// `holder`. On failure the current settings stay in place.
pub fn reload_runtime(
    holder: &RuntimeConfigHolder,
    path: Option<&Path>,
    trigger: &ReloadTrigger,
) -> ReloadResult {
    let loaded = match path {
        Some(path) => load_config_from_path(path, ConfigBuilder::new()),
        None => load_config(ConfigBuilder::new()),
    }
    .and_then(ConfigBuilder::build);

    match loaded {
        Ok(config) => holder.reload(RuntimeConfig::from_config(&config), trigger),
        Err(e) => {
            tracing::warn!(%trigger, error = %e, "Runtime configuration reload failed");
            ReloadResult::failure(e.to_string())
        }
    }
}

/// Reload `holder` once per trigger received, until every sender is dropped
pub async fn run_reload_loop(
    holder: Arc<RuntimeConfigHolder>,
    path: Option<PathBuf>,
    mut triggers: mpsc::Receiver<ReloadTrigger>,
) {
    while let Some(trigger) = triggers.recv().await {
        // Outcome is logged by the reload itself.
        let _ = reload_runtime(&holder, path.as_deref(), &trigger);
    }
    tracing::debug!("Reload trigger channel closed");
}

/// Forward every SIGHUP to `triggers` as [`ReloadTrigger::Signal`]
#[cfg(unix)]
pub fn spawn_sighup_listener(triggers: mpsc::Sender<ReloadTrigger>) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())
        .map_err(|e| crate::Error::Config(format!("Cannot install SIGHUP handler: {e}")))?;

    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading configuration");
            if triggers.send(ReloadTrigger::Signal).await.is_err() {
                break;
            }
        }
    }))
}

/// Reload runtime settings on SIGHUP for as long as the returned task runs
#[cfg(unix)]
pub fn spawn_reload_on_sighup(
    holder: Arc<RuntimeConfigHolder>,
    path: Option<PathBuf>,
) -> Result<JoinHandle<()>> {
    let (tx, rx) = mpsc::channel(4);
    let listener = spawn_sighup_listener(tx)?;

    Ok(tokio::spawn(async move {
        run_reload_loop(holder, path, rx).await;
        listener.abort();
    }))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::cache::EntityType;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_config_no_file() {
        let _guard = env::ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Should not fail even if no config file exists
        let result = load_config(ConfigBuilder::new());
        assert!(result.is_ok());
    }

    #[test]
    fn test_reload_runtime_from_path() {
        let _guard = env::ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if std::env::var("CACHE_TTL_MINUTES").is_ok() {
            return;
        }

        let file = write_config("[cache.ttl]\ndefault_minutes = 10\n\n[cache.ttl.overrides]\nbudget = 1\n");
        let holder = RuntimeConfigHolder::default();

        let result = reload_runtime(&holder, Some(file.path()), &ReloadTrigger::Manual);
        assert!(result.success, "{:?}", result.error);
        assert!(result.changed.contains(&"ttl.default".to_string()));
        assert_eq!(holder.ttl_for(EntityType::Keyword), Duration::from_secs(600));
        assert_eq!(holder.ttl_for(EntityType::Budget), Duration::from_secs(60));
    }

    #[test]
    fn test_reload_runtime_keeps_settings_on_error() {
        let _guard = env::ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if std::env::var("CACHE_TTL_MINUTES").is_ok() {
            return;
        }

        let file = write_config("[cache.ttl]\ndefault_minutes = 0\n");
        let holder = RuntimeConfigHolder::default();

        let result = reload_runtime(&holder, Some(file.path()), &ReloadTrigger::Signal);
        assert!(!result.success);
        assert_eq!(holder.ttl_for(EntityType::Campaign), Duration::from_secs(3600));
    }

    #[test]
    fn test_reload_loop_applies_each_trigger() {
        let _guard = env::ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if std::env::var("CACHE_TTL_MINUTES").is_ok() {
            return;
        }

        let file = write_config("[cache.ttl]\ndefault_minutes = 5\n");
        let holder = Arc::new(RuntimeConfigHolder::default());
        let (tx, rx) = mpsc::channel(4);

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            tx.send(ReloadTrigger::Signal).await.unwrap();
            drop(tx);
            run_reload_loop(Arc::clone(&holder), Some(file.path().to_path_buf()), rx).await;
        });

        assert_eq!(holder.ttl_for(EntityType::Campaign), Duration::from_secs(300));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sighup_is_forwarded_as_signal_trigger() {
        let (tx, mut rx) = mpsc::channel(4);
        let listener = spawn_sighup_listener(tx).unwrap();

        let status = std::process::Command::new("kill")
            .args(["-HUP", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let trigger = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(matches!(trigger, Some(ReloadTrigger::Signal)));
        listener.abort();
    }
}
