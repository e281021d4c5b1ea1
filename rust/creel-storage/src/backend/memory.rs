use std::{collections::BTreeMap, sync::Arc};

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::RwLock;

use crate::CreelStorageError;

use super::{StorageBackend, StorageScan};

/// A trivial implementation of [StorageBackend] - backed by a [BTreeMap] -
/// where all values are kept in memory and never persisted. Keys are held
/// in order, so prefix scans come for free.
#[derive(Clone, Default)]
pub struct MemoryStorageBackend<Key, Value>
where
    Key: Ord,
{
    entries: Arc<RwLock<BTreeMap<Key, Value>>>,
}

#[async_trait]
impl<Key, Value> StorageBackend for MemoryStorageBackend<Key, Value>
where
    Key: Clone + Ord + Send + Sync,
    Value: Clone + Send + Sync,
{
    type Key = Key;
    type Value = Value;
    type Error = CreelStorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        let mut entries = self.entries.write().await;
        entries.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn delete(&mut self, key: &Self::Key) -> Result<bool, Self::Error> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }
}

impl StorageScan for MemoryStorageBackend<String, Vec<u8>> {
    fn scan_prefix(
        &self,
        prefix: String,
    ) -> BoxStream<'_, Result<(String, Vec<u8>), CreelStorageError>> {
        Box::pin(try_stream! {
            // Snapshot the matching range so the lock is not held while
            // the consumer works through the stream.
            let snapshot: Vec<(String, Vec<u8>)> = {
                let entries = self.entries.read().await;
                entries
                    .range(prefix.clone()..)
                    .take_while(|(key, _)| key.starts_with(&prefix))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            };
            for entry in snapshot {
                yield entry;
            }
        })
    }
}
