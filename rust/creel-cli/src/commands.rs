//! Command implementations.

pub mod space;
pub mod upload;

use crate::config::AppConfig;
use anyhow::Result;
use creel_client::DelegationStore;
use creel_storage::FileSystemStorageBackend;

/// Open the delegation store under the configured data directory.
pub async fn open_store(
    config: &AppConfig,
) -> Result<DelegationStore<FileSystemStorageBackend<String, Vec<u8>>>> {
    let backend = FileSystemStorageBackend::new(config.delegation_dir()).await?;
    Ok(DelegationStore::new(backend))
}
