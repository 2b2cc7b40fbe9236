use thiserror::Error;

use crate::cache::{KeyError, StorageError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cache storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

impl Error {
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Key(_))
    }

    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Unsupported backend or storage that failed to initialize
    #[must_use]
    pub const fn is_startup_failure(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Storage(e) => e.is_startup_fatal(),
            Self::InvalidInput(_) | Self::Key(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BackendKind;

    #[test]
    fn test_config_predicate() {
        let err = Error::Config("invalid config".to_string());
        assert!(err.is_config());
        assert!(!err.is_storage());
        assert!(err.is_startup_failure());
    }

    #[test]
    fn test_invalid_input_predicate() {
        let err = Error::InvalidInput("customer id".to_string());
        assert!(err.is_invalid_input());
        assert!(!err.is_config());
        assert!(!err.is_startup_failure());
    }

    #[test]
    fn test_storage_from() {
        let err: Error = StorageError::UnsupportedBackend("redis".to_string()).into();
        assert!(err.is_storage());
        assert!(err.is_startup_failure());
        assert!(err.to_string().contains("redis"));
    }

    #[test]
    fn test_recoverable_storage_error_is_not_startup_failure() {
        let err: Error = StorageError::read(BackendKind::Sqlite, "disk I/O error").into();
        assert!(!err.is_startup_failure());
    }

    #[test]
    fn test_key_error_is_invalid_input() {
        let err: Error = KeyError::InvalidEntityType("nope".to_string()).into();
        assert!(err.is_invalid_input());
        assert_eq!(err.to_string(), "Invalid entity type: nope");
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("bad date".to_string());
        assert_eq!(err.to_string(), "Invalid input: bad date");
    }
}
