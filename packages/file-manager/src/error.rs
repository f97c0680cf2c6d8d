//! Error types for the file manager.

use keepfs_object_store::ObjectStoreError;
use thiserror::Error;

/// Why a user-supplied name could not become a path segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// Nothing left after trimming whitespace.
    #[error("name is empty")]
    Empty,

    /// The name contains `/` or `\`.
    #[error("name '{name}' contains a path separator")]
    ContainsSeparator { name: String },

    /// Nothing survived ASCII folding (punctuation only, non-Latin script).
    #[error("name '{name}' has no characters usable in a folder name")]
    NoAsciiContent { name: String },

    /// A stored name that is not already in sanitized form.
    #[error("'{name}' is not a valid path segment")]
    NotSanitized { name: String },
}

/// How an error should be surfaced to the person browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational; the operation did what was asked or was a no-op.
    Notice,
    /// Recoverable; the operation completed partially or was refused locally.
    Warning,
    /// The operation produced nothing usable.
    Blocking,
}

/// Errors in the file manager.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    #[error("folders cannot be nested more than {max_depth} levels deep")]
    MaxDepthExceeded { max_depth: usize },

    #[error("already at the contract root")]
    AtRoot,

    #[error("'{key}' already exists")]
    AlreadyExists { key: String },

    #[error("path '{path}' is outside '{root}'")]
    InvalidScope { path: String, root: String },

    #[error("listing incomplete: {} folder(s) could not be listed", .failed_prefixes.len())]
    PartialListing { failed_prefixes: Vec<String> },

    #[error("deleted {succeeded} object(s), {} could not be deleted", .failed_keys.len())]
    PartialDelete {
        succeeded: usize,
        failed_keys: Vec<String>,
    },

    #[error("none of the {attempted} selected file(s) could be downloaded")]
    EmptyArchive { attempted: usize },

    #[error("object store unavailable: {0}")]
    StoreUnavailable(#[source] ObjectStoreError),

    #[error("no entry named '{name}' in '{path}'")]
    NotFound { name: String, path: String },

    #[error("'{name}' is not a folder")]
    NotAFolder { name: String },

    #[error("'{name}' is not a file")]
    NotAFile { name: String },

    #[error("nothing is selected")]
    NothingSelected,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("archive encoding failed: {0}")]
    Archive(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[source] ObjectStoreError),
}

impl Error {
    /// Severity per the propagation policy: partial batch results and
    /// duplicate folders never block, empty archives and backend failures do.
    pub fn severity(&self) -> Severity {
        match self {
            Error::AlreadyExists { .. } => Severity::Notice,
            Error::InvalidName(_)
            | Error::MaxDepthExceeded { .. }
            | Error::AtRoot
            | Error::PartialListing { .. }
            | Error::PartialDelete { .. }
            | Error::NotFound { .. }
            | Error::NotAFolder { .. }
            | Error::NotAFile { .. }
            | Error::NothingSelected => Severity::Warning,
            Error::InvalidScope { .. }
            | Error::EmptyArchive { .. }
            | Error::StoreUnavailable(_)
            | Error::Cancelled
            | Error::InvalidConfig { .. }
            | Error::Archive(_)
            | Error::Store(_) => Severity::Blocking,
        }
    }

    /// True if the operation should be treated as failed.
    pub fn is_blocking(&self) -> bool {
        self.severity() == Severity::Blocking
    }
}

impl From<ObjectStoreError> for Error {
    fn from(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::AlreadyExists { key } => Error::AlreadyExists { key },
            e if e.is_unavailable() => Error::StoreUnavailable(e),
            e => Error::Store(e),
        }
    }
}

/// Result type alias for file manager operations.
pub type Result<T> = std::result::Result<T, Error>;
