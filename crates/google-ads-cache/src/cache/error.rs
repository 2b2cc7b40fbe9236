//! Cache error types

use std::time::Duration;

use thiserror::Error;

use super::config::BackendKind;

/// Storage backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("{backend} storage initialization failed: {message}")]
    Init {
        backend: BackendKind,
        message: String,
    },

    #[error("{backend} storage read failed: {message}")]
    Read {
        backend: BackendKind,
        message: String,
    },

    #[error("{backend} storage write failed: {message}")]
    Write {
        backend: BackendKind,
        message: String,
    },

    #[error("{backend} connection pool exhausted: {message}")]
    PoolExhausted {
        backend: BackendKind,
        message: String,
    },

    #[error("{backend} storage is closed")]
    Closed { backend: BackendKind },

    #[error("Unsupported cache backend: {0}")]
    UnsupportedBackend(String),
}

impl StorageError {
    pub fn init(backend: BackendKind, message: impl ToString) -> Self {
        Self::Init {
            backend,
            message: message.to_string(),
        }
    }

    pub fn read(backend: BackendKind, message: impl ToString) -> Self {
        Self::Read {
            backend,
            message: message.to_string(),
        }
    }

    pub fn write(backend: BackendKind, message: impl ToString) -> Self {
        Self::Write {
            backend,
            message: message.to_string(),
        }
    }

    /// Errors that must abort startup rather than degrade to a miss
    #[must_use]
    pub const fn is_startup_fatal(&self) -> bool {
        matches!(self, Self::Init { .. } | Self::UnsupportedBackend(_))
    }

    #[must_use]
    pub const fn backend(&self) -> Option<BackendKind> {
        match self {
            Self::Init { backend, .. }
            | Self::Read { backend, .. }
            | Self::Write { backend, .. }
            | Self::PoolExhausted { backend, .. }
            | Self::Closed { backend } => Some(*backend),
            Self::UnsupportedBackend(_) => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Why the cache could not be consulted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

/// Unified signal that caching could not be consulted.
///
/// Always recoverable: callers fall through to the remote API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cache unavailable during {operation}: {reason}")]
pub struct CacheUnavailable {
    pub operation: &'static str,
    #[source]
    pub reason: UnavailableReason,
}

impl CacheUnavailable {
    pub fn new(operation: &'static str, reason: impl Into<UnavailableReason>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.reason, UnavailableReason::Timeout(_))
    }
}

/// Result type for cache manager operations
pub type CacheResult<T> = Result<T, CacheUnavailable>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_error_display() {
        let err = StorageError::init(BackendKind::Sqlite, "unable to open database file");
        let msg = err.to_string();
        assert!(msg.contains("sqlite"));
        assert!(msg.contains("initialization"));
        assert!(msg.contains("unable to open"));
    }

    #[test]
    fn test_read_write_error_display() {
        let read = StorageError::read(BackendKind::Postgres, "connection reset");
        assert!(read.to_string().contains("postgres storage read failed"));

        let write = StorageError::write(BackendKind::Sqlite, "disk full");
        assert!(write.to_string().contains("write failed: disk full"));
    }

    #[test]
    fn test_unsupported_backend_display() {
        let err = StorageError::UnsupportedBackend("redis".to_string());
        assert!(err.to_string().contains("Unsupported"));
        assert!(err.to_string().contains("redis"));
        assert_eq!(err.backend(), None);
    }

    #[test]
    fn test_is_startup_fatal() {
        assert!(StorageError::init(BackendKind::Sqlite, "x").is_startup_fatal());
        assert!(StorageError::UnsupportedBackend("x".into()).is_startup_fatal());
        assert!(!StorageError::read(BackendKind::Sqlite, "x").is_startup_fatal());
        assert!(
            !StorageError::Closed {
                backend: BackendKind::Sqlite
            }
            .is_startup_fatal()
        );
    }

    #[test]
    fn test_cache_unavailable_from_storage() {
        let err = CacheUnavailable::new("get", StorageError::read(BackendKind::Sqlite, "io"));
        assert_eq!(err.operation, "get");
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("cache unavailable during get"));
    }

    #[test]
    fn test_cache_unavailable_timeout() {
        let err = CacheUnavailable::new("put", UnavailableReason::Timeout(Duration::from_secs(2)));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("timed out"));
    }
}
