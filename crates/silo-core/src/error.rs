//! Error types for silo-core

use thiserror::Error;

/// Errors every stream store reports, whatever backend sits underneath.
///
/// Backend-specific failures are translated into these variants at the
/// adapter boundary; anything without a mapping travels as [`StoreError::Backend`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// Path (or its parent) does not exist
    #[error("{0}: no such file or directory")]
    NotFound(String),

    /// Target of a create operation already exists
    #[error("{0}: file exists")]
    AlreadyExists(String),

    /// A file operation was attempted on a directory
    #[error("{0} is a directory")]
    IsADirectory(String),

    /// A directory operation was attempted on a file
    #[error("{0}: not a directory")]
    NotADirectory(String),

    /// Remove was called on a directory that still has entries
    #[error("{0}: directory not empty")]
    DirectoryNotEmpty(String),

    /// The backend holds data the store model cannot represent, such as
    /// a file and a directory marker under the same name
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Opaque failure reported by the underlying service
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Local I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path cannot be used for the requested operation
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Store URL could not be parsed or lacks a required part
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No constructor is registered for the URL scheme
    #[error("unknown scheme: {0}")]
    UnknownScheme(String),

    /// A constructor was registered twice for the same scheme
    #[error("scheme registered more than once: {0}")]
    DuplicateScheme(String),

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Wrap any backend error that has no mapping into the taxonomy.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }

    /// True for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for std::io::Error {
    fn from(err: StoreError) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::IsADirectory(_) => ErrorKind::IsADirectory,
            StoreError::NotADirectory(_) => ErrorKind::NotADirectory,
            StoreError::DirectoryNotEmpty(_) => ErrorKind::DirectoryNotEmpty,
            StoreError::InvalidPath(_) | StoreError::InvalidUrl(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Other,
        };
        match err {
            StoreError::Io(io_err) => io_err,
            other => std::io::Error::new(kind, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_path() {
        let err = StoreError::IsADirectory("dir/sub".to_string());
        assert_eq!(err.to_string(), "dir/sub is a directory");

        let err = StoreError::DirectoryNotEmpty("dir".to_string());
        assert!(err.to_string().ends_with("directory not empty"));
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let io_err: std::io::Error = StoreError::NotFound("x".to_string()).into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound);

        let original = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let io_err: std::io::Error = StoreError::Io(original).into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::PermissionDenied);
    }
}
