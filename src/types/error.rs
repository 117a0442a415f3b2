//! Error types for the storage adapter
//!
//! Argument errors carry the short codes callers historically matched on
//! (`invalid-file`, `invalid-offset`, ...). Store failures are collapsed
//! into opaque kinds; the driver's detail is logged where it happens.

use std::fmt;

/// Which argument was rejected before touching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidArgument {
    /// Empty blob key
    Key,
    /// Empty key list passed to `read_many`
    Keys,
    /// Missing text contents
    Contents,
    /// Missing or empty binary buffer
    Buffer,
    /// Negative list offset
    Offset,
    /// Zero page size
    PageSize,
    /// Empty list path
    Path,
    /// Empty list item id
    ItemId,
}

impl InvalidArgument {
    /// Stable error code for this argument kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::Key => "invalid-file",
            Self::Keys => "invalid-files",
            Self::Contents => "invalid-contents",
            Self::Buffer => "invalid-buffer",
            Self::Offset => "invalid-offset",
            Self::PageSize => "invalid-page-size",
            Self::Path => "invalid-path",
            Self::ItemId => "invalid-itemid",
        }
    }
}

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Main error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{0}")]
    InvalidArgument(InvalidArgument),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Collection or index creation failed
    #[error("unknown-error")]
    Provisioning,

    /// A read, write or delete against a provisioned collection failed
    #[error("unknown-error")]
    Operation,

    #[error("flush is only available in test mode")]
    FlushDisabled,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// The rejected argument, if this is an argument error
    pub fn invalid_argument(&self) -> Option<InvalidArgument> {
        match self {
            Self::InvalidArgument(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Whether the caller could reasonably retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provisioning | Self::Operation | Self::Connection(_))
    }
}

impl From<InvalidArgument> for StorageError {
    fn from(kind: InvalidArgument) -> Self {
        Self::InvalidArgument(kind)
    }
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_codes() {
        assert_eq!(
            StorageError::from(InvalidArgument::Key).to_string(),
            "invalid-file"
        );
        assert_eq!(
            StorageError::from(InvalidArgument::Offset).to_string(),
            "invalid-offset"
        );
        assert_eq!(InvalidArgument::Keys.code(), "invalid-files");
    }

    #[test]
    fn test_store_failures_are_opaque() {
        assert_eq!(StorageError::Provisioning.to_string(), "unknown-error");
        assert_eq!(StorageError::Operation.to_string(), "unknown-error");
        assert!(StorageError::Operation.is_retryable());
        assert!(!StorageError::from(InvalidArgument::Buffer).is_retryable());
    }

    #[test]
    fn test_invalid_argument_accessor() {
        let err = StorageError::from(InvalidArgument::PageSize);
        assert_eq!(err.invalid_argument(), Some(InvalidArgument::PageSize));
        assert_eq!(StorageError::FlushDisabled.invalid_argument(), None);
    }
}
