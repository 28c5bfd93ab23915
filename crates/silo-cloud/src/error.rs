use silo_core::StoreError;
use thiserror::Error;

/// Failures specific to the object-store layer
///
/// Everything here is converted into a [`StoreError`] before it leaves the
/// crate; callers only ever see the store taxonomy.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("transfer of {0} ended without reporting a result")]
    TransferLost(String),

    #[error("transfer of {0} is no longer accepting data")]
    PipeClosed(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;

impl From<CloudError> for StoreError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::ObjectStore(object_store::Error::NotFound { path, .. }) => {
                StoreError::NotFound(path)
            }
            CloudError::ObjectStore(object_store::Error::AlreadyExists { path, .. }) => {
                StoreError::AlreadyExists(path)
            }
            other => StoreError::backend(other),
        }
    }
}

impl From<CloudError> for std::io::Error {
    fn from(err: CloudError) -> Self {
        StoreError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_errors_keep_their_kind() {
        let not_found = object_store::Error::NotFound {
            path: "a/b".to_string(),
            source: "missing".into(),
        };
        let err: StoreError = CloudError::from(not_found).into();
        assert!(matches!(err, StoreError::NotFound(p) if p == "a/b"));

        let err: StoreError = CloudError::Runtime("boom".to_string()).into();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
