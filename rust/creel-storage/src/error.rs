use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum CreelStorageError {
    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),

    /// An error that occurs when a stored key is not valid for the
    /// backend's key type
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}
