//! The delegation store.
//!
//! Every delegation is written twice: once under its content link (the
//! primary record) and once under a derived index key
//! `{audience}/{command with "/" replaced by "~"}/{subject|"null"}/{link}`,
//! which is what makes `(audience, command, subject)` lookups a prefix
//! scan instead of a full walk. The two writes happen sequentially with
//! no rollback, so the store assumes a single writer per backing
//! directory; [`DelegationStore::repair`] removes index entries orphaned
//! by a crash between the writes.

use async_stream::try_stream;
use creel_storage::{CreelStorageError, StorageBackend, StorageScan};
use creel_ucan::{Command, Delegation, Did, Subject, codec, codec::CodecError};
use futures_util::{Stream, TryStreamExt};
use ipld_core::cid::Cid;
use thiserror::Error;
use tracing::debug;

/// Index-key segment standing in for the subject of a powerline
/// delegation (one with no subject restriction).
pub const NULL_SUBJECT: &str = "null";

/// Errors produced by the [`DelegationStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No delegation is stored under the requested link.
    #[error("delegation not found")]
    NotFound,

    /// A stored record failed to decode, or a delegation failed to
    /// encode for storage.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The underlying storage failed.
    #[error(transparent)]
    Storage(#[from] CreelStorageError),
}

/// A durable, doubly-indexed store of [`Delegation`]s.
///
/// Writers must be exclusive: the dual-key invariant is maintained by
/// sequential writes, not a transaction, so two processes mutating one
/// backing store concurrently can leave orphaned index entries behind.
/// Readers are unrestricted, and the streams returned by [`list`] and
/// [`find`] may be dropped mid-iteration.
///
/// [`list`]: DelegationStore::list
/// [`find`]: DelegationStore::find
#[derive(Clone)]
pub struct DelegationStore<B> {
    backend: B,
}

impl<B> DelegationStore<B>
where
    B: StorageBackend<Key = String, Value = Vec<u8>> + StorageScan,
{
    /// Wrap a storage backend in a delegation store.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Persist a delegation under both its primary and index keys,
    /// returning its content link.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when encoding or either write fails; a
    /// failed second write leaves no successful result behind.
    pub async fn put(&mut self, delegation: &Delegation) -> Result<Cid, StoreError> {
        let bytes = delegation.to_bytes()?;
        let link = codec::link_of(&bytes);
        debug!(link = %link, aud = %delegation.audience(), "storing delegation");
        self.backend
            .set(link.to_string(), bytes.clone())
            .await
            .map_err(storage_err)?;
        self.backend
            .set(index_key(delegation, &link), bytes)
            .await
            .map_err(storage_err)?;
        Ok(link)
    }

    /// Fetch a delegation by its content link.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists under the
    /// link — distinct from storage and decode failures, so callers can
    /// branch on absence.
    pub async fn get(&self, link: &Cid) -> Result<Delegation, StoreError> {
        let bytes = self
            .backend
            .get(&link.to_string())
            .await
            .map_err(storage_err)?
            .ok_or(StoreError::NotFound)?;
        Ok(codec::decode(&bytes)?)
    }

    /// Remove a delegation, deleting both its index entry and its
    /// primary record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the delegation was never
    /// stored (or already removed).
    pub async fn del(&mut self, link: &Cid) -> Result<(), StoreError> {
        let delegation = self.get(link).await?;
        debug!(link = %link, "removing delegation");
        self.backend
            .delete(&index_key(&delegation, link))
            .await
            .map_err(storage_err)?;
        self.backend
            .delete(&link.to_string())
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Stream every delegation granted to `audience`, in stable
    /// index-key order.
    ///
    /// The stream is lazy and single-pass; dropping it early is safe. A
    /// record that fails to decode surfaces as the final, error element.
    pub fn list(
        &self,
        audience: &Did,
    ) -> impl Stream<Item = Result<(Cid, Delegation), StoreError>> + '_ {
        debug!(aud = %audience, "listing delegations");
        let prefix = format!("{audience}/");
        self.scan_decoding(vec![prefix])
    }

    /// Stream every delegation granted to `audience` that covers
    /// `command` — including delegations for ancestor commands, up to
    /// the top command `/`.
    ///
    /// When a subject is given, both subject-scoped and powerline
    /// (subject-less) delegations match; the sentinel used to index the
    /// latter never leaks to callers.
    pub fn find(
        &self,
        audience: &Did,
        command: &Command,
        subject: Option<&Did>,
    ) -> impl Stream<Item = Result<(Cid, Delegation), StoreError>> + '_ {
        debug!(aud = %audience, cmd = %command, "finding delegations");
        let mut prefixes = Vec::new();
        for ancestor in command.ancestors() {
            let base = format!("{audience}/{}/", sanitize_command(&ancestor));
            match subject {
                Some(subject) => {
                    prefixes.push(format!("{base}{subject}/"));
                    prefixes.push(format!("{base}{NULL_SUBJECT}/"));
                }
                None => prefixes.push(base),
            }
        }
        self.scan_decoding(prefixes)
    }

    /// Remove index entries whose primary record is missing.
    ///
    /// A crash between the two writes of [`put`] (or the two deletes of
    /// [`del`]) can strand an index entry; this reconciliation pass
    /// restores the dual-key invariant and returns the number of entries
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if scanning or deleting fails.
    ///
    /// [`put`]: DelegationStore::put
    /// [`del`]: DelegationStore::del
    pub async fn repair(&mut self) -> Result<usize, StoreError> {
        // Index keys all start with the audience DID; primary keys are
        // bare links and never match this prefix.
        let mut orphans = Vec::new();
        {
            let mut entries = self.backend.scan_prefix("did:".to_string());
            while let Some((key, _)) = entries.try_next().await? {
                let Some(link) = key.rsplit('/').next() else {
                    continue;
                };
                if self
                    .backend
                    .get(&link.to_string())
                    .await
                    .map_err(storage_err)?
                    .is_none()
                {
                    orphans.push(key);
                }
            }
        }
        for key in &orphans {
            debug!(key = %key, "removing orphaned index entry");
            self.backend.delete(key).await.map_err(storage_err)?;
        }
        Ok(orphans.len())
    }

    fn scan_decoding(
        &self,
        prefixes: Vec<String>,
    ) -> impl Stream<Item = Result<(Cid, Delegation), StoreError>> + '_ {
        try_stream! {
            for prefix in prefixes {
                let mut entries = self.backend.scan_prefix(prefix);
                while let Some((_, bytes)) = entries.try_next().await? {
                    let delegation: Delegation = codec::decode(&bytes)?;
                    let link = codec::link_of(&bytes);
                    yield (link, delegation);
                }
            }
        }
    }
}

fn storage_err<E: Into<CreelStorageError>>(error: E) -> StoreError {
    StoreError::Storage(error.into())
}

/// The derived secondary key for a delegation:
/// `{audience}/{sanitized-command}/{subject|"null"}/{link}`.
fn index_key(delegation: &Delegation, link: &Cid) -> String {
    let sub = match delegation.subject() {
        Subject::Specific(did) => did.to_string(),
        Subject::Any => NULL_SUBJECT.to_string(),
    };
    format!(
        "{}/{}/{}/{}",
        delegation.audience(),
        sanitize_command(delegation.command()),
        sub,
        link
    )
}

/// Replace the command's hierarchy separator so it cannot break the
/// `/`-delimited key layout. The command vocabulary forbids `~` in
/// segments, so the substitution cannot collide.
fn sanitize_command(command: &Command) -> String {
    command.to_string().replace('/', "~")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_commands_keep_the_key_layout_flat() {
        let add = Command::from_static(&["blob", "add"]);
        assert_eq!(sanitize_command(&add), "~blob~add");
        assert_eq!(sanitize_command(&Command::top()), "~");
    }
}
