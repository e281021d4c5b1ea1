use crate::CreelStorageError;
use async_stream::try_stream;
use async_trait::async_trait;
use base58::{FromBase58, ToBase58};
use futures_util::stream::BoxStream;
use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use super::{StorageBackend, StorageScan};

/// A basic file-system-based [StorageBackend] implementation. All values
/// are stored inside a root directory as files named after their
/// (base58-encoded) keys, since keys routinely contain `/` and other
/// characters unfit for file names.
#[derive(Clone)]
pub struct FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    root_dir: PathBuf,
    key_type: PhantomData<Key>,
    value_type: PhantomData<Value>,
}

impl<Key, Value> FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    /// Creates a new [`FileSystemStorageBackend`] that stores files in
    /// `root_dir`.
    pub async fn new<Pathlike>(root_dir: Pathlike) -> Result<Self, CreelStorageError>
    where
        Pathlike: AsRef<Path>,
    {
        let root_dir = root_dir.as_ref().to_owned();
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|error| CreelStorageError::StorageBackend(format!("{error}")))?;
        Ok(Self {
            root_dir,
            key_type: PhantomData,
            value_type: PhantomData,
        })
    }

    fn make_path(&self, key: &Key) -> PathBuf {
        self.root_dir.join(key.as_ref().to_base58())
    }
}

#[async_trait]
impl<Key, Value> StorageBackend for FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone + Send + Sync,
    Value: AsRef<[u8]> + Clone + From<Vec<u8>> + Send + Sync,
{
    type Key = Key;
    type Value = Value;
    type Error = CreelStorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        tokio::fs::write(self.make_path(&key), value)
            .await
            .map_err(|error| CreelStorageError::StorageBackend(format!("{error}")))?;
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let path = self.make_path(key);
        if !path.exists() {
            return Ok(None);
        }

        tokio::fs::read(path)
            .await
            .map(|value| Some(Value::from(value)))
            .map_err(|error| CreelStorageError::StorageBackend(format!("{error}")))
    }

    async fn delete(&mut self, key: &Self::Key) -> Result<bool, Self::Error> {
        let path = self.make_path(key);
        if !path.exists() {
            return Ok(false);
        }

        tokio::fs::remove_file(path)
            .await
            .map(|()| true)
            .map_err(|error| CreelStorageError::StorageBackend(format!("{error}")))
    }
}

impl StorageScan for FileSystemStorageBackend<String, Vec<u8>> {
    fn scan_prefix(
        &self,
        prefix: String,
    ) -> BoxStream<'_, Result<(String, Vec<u8>), CreelStorageError>> {
        Box::pin(try_stream! {
            let mut matches = Vec::new();
            let mut dir = tokio::fs::read_dir(&self.root_dir)
                .await
                .map_err(|error| CreelStorageError::StorageBackend(format!("{error}")))?;
            while let Some(entry) = dir
                .next_entry()
                .await
                .map_err(|error| CreelStorageError::StorageBackend(format!("{error}")))?
            {
                let name = entry.file_name();
                let Some(key) = decode_key(&name.to_string_lossy()) else {
                    // Not one of our entries; leave it alone.
                    continue;
                };
                if key.starts_with(&prefix) {
                    matches.push((key, entry.path()));
                }
            }
            matches.sort();

            for (key, path) in matches {
                let value = tokio::fs::read(path)
                    .await
                    .map_err(|error| CreelStorageError::StorageBackend(format!("{error}")))?;
                yield (key, value);
            }
        })
    }
}

fn decode_key(file_name: &str) -> Option<String> {
    let bytes = file_name.from_base58().ok()?;
    String::from_utf8(bytes).ok()
}
