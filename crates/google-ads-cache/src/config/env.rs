//! Environment variable loading for configuration

use std::env;
use std::time::Duration;

use super::builder::ConfigBuilder;
use crate::Result;

/// Environment variable names
mod vars {
    pub const USE_CACHE: &str = "USE_CACHE";
    pub const DB_TYPE: &str = "DB_TYPE";
    pub const DB_PATH: &str = "DB_PATH";
    pub const SQLITE_POOL_SIZE: &str = "SQLITE_POOL_SIZE";
    pub const POSTGRES_URL: &str = "POSTGRES_URL";
    pub const POSTGRES_HOST: &str = "POSTGRES_HOST";
    pub const POSTGRES_PORT: &str = "POSTGRES_PORT";
    pub const POSTGRES_DATABASE: &str = "POSTGRES_DATABASE";
    pub const POSTGRES_USER: &str = "POSTGRES_USER";
    pub const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
    pub const POSTGRES_SSL_MODE: &str = "POSTGRES_SSL_MODE";
    pub const POSTGRES_POOL_SIZE: &str = "POSTGRES_POOL_SIZE";
    pub const CACHE_TTL_MINUTES: &str = "CACHE_TTL_MINUTES";
    pub const CACHE_GRACE_MINUTES: &str = "CACHE_GRACE_MINUTES";
    pub const CACHE_OP_TIMEOUT_MS: &str = "CACHE_OP_TIMEOUT_MS";
    pub const CACHE_POOL_WAIT_MS: &str = "CACHE_POOL_WAIT_MS";
    pub const CACHE_CLEANUP_INTERVAL_SECS: &str = "CACHE_CLEANUP_INTERVAL_SECS";
    pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    pub const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const CACHE_JSON_LOGS: &str = "CACHE_JSON_LOGS";
}

/// Load configuration from environment variables.
///
/// Unparseable numbers are ignored; an unknown `DB_TYPE` or TLS mode is kept
/// as given and rejected by [`ConfigBuilder::build`].
pub fn load_from_env(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    if let Ok(val) = env::var(vars::USE_CACHE) {
        builder = builder.cache_enabled(parse_bool(&val));
    }

    // Backend selection
    if let Ok(name) = env::var(vars::DB_TYPE) {
        builder = builder.backend(name);
    }

    if let Ok(path) = env::var(vars::DB_PATH)
        && !path.is_empty()
    {
        builder = builder.sqlite_path(path);
    }

    if let Some(size) = parse_var::<usize>(vars::SQLITE_POOL_SIZE) {
        builder = builder.sqlite_pool_size(size);
    }

    // PostgreSQL: URL first, discrete parameters override its parts
    if let Ok(url) = env::var(vars::POSTGRES_URL) {
        builder = builder.postgres_url(url);
    }

    if let Ok(host) = env::var(vars::POSTGRES_HOST) {
        builder = builder.postgres_host(host);
    }

    if let Some(port) = parse_var::<u16>(vars::POSTGRES_PORT) {
        builder = builder.postgres_port(port);
    }

    if let Ok(database) = env::var(vars::POSTGRES_DATABASE) {
        builder = builder.postgres_database(database);
    }

    if let Ok(user) = env::var(vars::POSTGRES_USER) {
        builder = builder.postgres_user(user);
    }

    if let Ok(password) = env::var(vars::POSTGRES_PASSWORD) {
        builder = builder.postgres_password(password);
    }

    if let Ok(mode) = env::var(vars::POSTGRES_SSL_MODE) {
        builder = builder.postgres_ssl_mode(mode);
    }

    if let Some(size) = parse_var::<usize>(vars::POSTGRES_POOL_SIZE) {
        builder = builder.postgres_pool_size(size);
    }

    // TTL policy
    if let Some(minutes) = parse_var::<u64>(vars::CACHE_TTL_MINUTES) {
        builder = builder.default_ttl(minutes_to_duration(minutes));
    }

    if let Some(minutes) = parse_var::<u64>(vars::CACHE_GRACE_MINUTES) {
        builder = builder.grace(minutes_to_duration(minutes));
    }

    // Timeouts
    if let Some(ms) = parse_var::<u64>(vars::CACHE_OP_TIMEOUT_MS) {
        builder = builder.op_timeout(Duration::from_millis(ms));
    }

    if let Some(ms) = parse_var::<u64>(vars::CACHE_POOL_WAIT_MS) {
        builder = builder.pool_wait(Duration::from_millis(ms));
    }

    if let Some(secs) = parse_var::<u64>(vars::CACHE_CLEANUP_INTERVAL_SECS) {
        builder = builder.cleanup_interval((secs > 0).then(|| Duration::from_secs(secs)));
    }

    // Telemetry
    if let Ok(endpoint) = env::var(vars::OTEL_EXPORTER_OTLP_ENDPOINT) {
        builder = builder.otlp_endpoint(Some(endpoint));
    }

    if let Ok(name) = env::var(vars::OTEL_SERVICE_NAME) {
        builder = builder.service_name(name);
    }

    if let Ok(level) = env::var(vars::RUST_LOG) {
        builder = builder.log_level(level);
    }

    if let Ok(val) = env::var(vars::CACHE_JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

pub(super) const fn minutes_to_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Serializes tests that read or mutate the process environment
#[cfg(test)]
pub(super) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
