//! Runtime configuration that can be reloaded without restart

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use super::Config;
use crate::cache::{CacheTtlConfig, EntityType};

/// Runtime configuration parameters that can be changed without restart.
///
/// These parameters are read per request by the cached service. Backend
/// selection and pool sizing are fixed at startup and never live here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// TTL policy and grace period
    pub ttl: CacheTtlConfig,
    /// Log level filter
    pub log_level: String,
}

impl RuntimeConfig {
    /// Create runtime config from full config
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: config.cache.ttl.clone(),
            log_level: config.telemetry.log_level.clone(),
        }
    }

    /// Names of the parameters that differ from `other`
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<String> {
        let mut changed = Vec::new();
        if self.ttl.default != other.ttl.default {
            changed.push("ttl.default".to_string());
        }
        if self.ttl.grace != other.ttl.grace {
            changed.push("ttl.grace".to_string());
        }
        if self.ttl.overrides != other.ttl.overrides {
            changed.push("ttl.overrides".to_string());
        }
        if self.log_level != other.log_level {
            changed.push("log_level".to_string());
        }
        changed
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ttl: CacheTtlConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

/// Thread-safe runtime configuration holder with atomic updates.
///
/// Uses `ArcSwap` for lock-free reads during request handling.
/// In-flight requests continue with their captured config reference.
#[derive(Debug)]
pub struct RuntimeConfigHolder {
    inner: ArcSwap<RuntimeConfig>,
}

impl RuntimeConfigHolder {
    /// Create a new holder with initial config
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            inner: ArcSwap::from_pointee(config),
        }
    }

    /// Get current runtime config (lock-free read)
    #[must_use]
    pub fn load(&self) -> Arc<RuntimeConfig> {
        self.inner.load_full()
    }

    /// Update runtime config atomically
    pub fn store(&self, config: RuntimeConfig) {
        self.inner.store(Arc::new(config));
    }

    /// Replace the runtime config and report what changed
    pub fn reload(&self, config: RuntimeConfig, trigger: &ReloadTrigger) -> ReloadResult {
        let changed = self.inner.load().diff(&config);
        self.store(config);
        tracing::info!(%trigger, changed = ?changed, "Runtime configuration reloaded");
        ReloadResult::success(changed)
    }

    /// TTL for an entity type under the current policy
    #[must_use]
    pub fn ttl_for(&self, entity_type: EntityType) -> Duration {
        self.inner.load().ttl.ttl_for(entity_type)
    }

    /// Grace period under the current policy
    #[must_use]
    pub fn grace(&self) -> Duration {
        self.inner.load().ttl.grace
    }
}

impl Default for RuntimeConfigHolder {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

/// Reload trigger source for audit logging
#[derive(Debug, Clone)]
pub enum ReloadTrigger {
    /// SIGHUP signal received
    Signal,
    /// Programmatic reload
    Manual,
}

impl fmt::Display for ReloadTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "SIGHUP"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Result of a configuration reload attempt
#[derive(Debug, Clone)]
pub struct ReloadResult {
    /// Whether reload succeeded
    pub success: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Parameters that changed
    pub changed: Vec<String>,
}

impl ReloadResult {
    /// Create a successful reload result
    #[must_use]
    pub const fn success(changed: Vec<String>) -> Self {
        Self {
            success: true,
            error: None,
            changed,
        }
    }

    /// Create a failed reload result
    #[must_use]
    pub const fn failure(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            changed: Vec::new(),
        }
    }
}
