//! Error taxonomy shared by every backend and the storage facade.
//!
//! An absent key is never an error: drivers return `Ok(None)` and the
//! facade passes that through. Only configuration, transport, and
//! persistence failures surface as [`StorageError`].

use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A backend was selected but required configuration is missing or
    /// invalid at call time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network or connection failure talking to a remote backend.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote KV service answered with a non-success status.
    #[error("Remote KV error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The file document could not be written or the storage directory
    /// could not be created.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Whether the facade may recover from this failure by retrying
    /// against the file-backed driver.
    ///
    /// Configuration and persistence failures are not recoverable: the
    /// former means the fallback decision itself is unsound, the latter
    /// means the fallback target is broken.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Api { .. })
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(StorageError::transport("connection refused").is_recoverable());
        assert!(StorageError::Api {
            status: 500,
            message: "internal".to_string(),
        }
        .is_recoverable());

        assert!(!StorageError::configuration("missing url").is_recoverable());
        assert!(!StorageError::persistence("disk full").is_recoverable());
    }

    #[test]
    fn test_io_error_maps_to_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io.into();
        assert!(matches!(err, StorageError::Persistence(_)));
    }

    #[test]
    fn test_display_formatting() {
        let err = StorageError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Remote KV error (status 503): unavailable"
        );
    }
}
