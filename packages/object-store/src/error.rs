//! Error types for the object store layer.
//!
//! Errors at this level describe what happened to a key or to the backend.
//! Folder semantics (depth, scope, naming) belong to the file manager.

use thiserror::Error;

/// Errors reported by an [`ObjectStore`](crate::ObjectStore) backend.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// No object exists at the key.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// An upload targeted a key that is already occupied.
    #[error("object already exists: {key}")]
    AlreadyExists { key: String },

    /// The key cannot be addressed by this backend.
    #[error("invalid object key '{key}': {message}")]
    InvalidKey { key: String, message: String },

    /// The backend is unreachable or refused service.
    #[error("object store unavailable: {message}")]
    Unavailable { message: String },

    /// The backend did not answer in time.
    #[error("object store timed out: {operation}")]
    Timeout { operation: String },

    /// Local I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl ObjectStoreError {
    /// True for failures of the backend itself rather than of a single key.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::Unavailable { .. }
                | ObjectStoreError::Timeout { .. }
                | ObjectStoreError::Transport(_)
        )
    }

    /// Shorthand used by backends when a lock or connection is unusable.
    pub fn unavailable(message: impl Into<String>) -> Self {
        ObjectStoreError::Unavailable {
            message: message.into(),
        }
    }
}

/// Result type alias for object store operations.
pub type Result<T> = std::result::Result<T, ObjectStoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn display_includes_key() {
        let e = ObjectStoreError::NotFound {
            key: "uploads/c1/a.txt".to_string(),
        };
        assert!(e.to_string().contains("uploads/c1/a.txt"));

        let e = ObjectStoreError::AlreadyExists {
            key: "uploads/c1/x/.keep".to_string(),
        };
        assert!(e.to_string().contains("already exists"));
    }

    #[test]
    fn unavailable_classification() {
        assert!(ObjectStoreError::unavailable("down").is_unavailable());
        assert!(ObjectStoreError::Timeout {
            operation: "list".to_string()
        }
        .is_unavailable());
        assert!(!ObjectStoreError::NotFound {
            key: "k".to_string()
        }
        .is_unavailable());
    }

    #[test]
    fn io_error_converts_and_keeps_source() {
        let e: ObjectStoreError = std::io::Error::other("disk gone").into();
        assert!(matches!(e, ObjectStoreError::Io(_)));
        assert!(StdError::source(&e).is_some());
    }
}
