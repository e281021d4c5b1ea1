use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::CreelStorageError;

mod memory;
pub use memory::*;

mod fs;
pub use fs::*;

/// A [StorageBackend] is a facade over some generalized storage substrate
/// that is capable of storing, retrieving and deleting values by some key
#[async_trait]
pub trait StorageBackend: Clone {
    /// The key type used by this [StorageBackend]
    type Key: Send + Sync;
    /// The value type able to be stored by this [StorageBackend]
    type Value: Send;
    /// The error type produced by this [StorageBackend]
    type Error: Into<CreelStorageError>;

    /// Store the given value against the given key
    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error>;
    /// Retrieve a value (if any) stored against the given key
    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error>;
    /// Remove the value stored against the given key, reporting whether
    /// an entry existed
    async fn delete(&mut self, key: &Self::Key) -> Result<bool, Self::Error>;
}

/// Ordered prefix scans over a [StorageBackend] with string keys and byte
/// values.
///
/// The returned stream is lazy and single-pass: entries are produced in
/// lexicographic key order, and the consumer may drop the stream at any
/// point without leaking resources or disturbing the backend.
pub trait StorageScan: StorageBackend<Key = String, Value = Vec<u8>> {
    /// Stream every `(key, value)` entry whose key starts with `prefix`
    fn scan_prefix(
        &self,
        prefix: String,
    ) -> BoxStream<'_, Result<(String, Vec<u8>), CreelStorageError>>;
}

#[async_trait]
impl<T> StorageBackend for Arc<Mutex<T>>
where
    T: StorageBackend + Send,
{
    type Key = T::Key;
    type Value = T::Value;
    type Error = T::Error;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        let mut inner = self.lock().await;
        inner.set(key, value).await
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let inner = self.lock().await;
        inner.get(key).await
    }

    async fn delete(&mut self, key: &Self::Key) -> Result<bool, Self::Error> {
        let mut inner = self.lock().await;
        inner.delete(key).await
    }
}
