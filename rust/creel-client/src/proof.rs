//! Proof-chain resolution.
//!
//! Answers "how is `invoker` authorized to run `command` over
//! `subject`?" by walking the delegation store: find delegations granted
//! to the invoker, then delegations granted to their issuers, until one
//! is reached that the subject itself issued.

use creel_storage::{StorageBackend, StorageScan};
use creel_ucan::{Command, Delegation, Did};
use futures_util::{TryStreamExt, pin_mut};
use ipld_core::cid::Cid;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

use crate::store::{DelegationStore, StoreError};

/// Upper bound on chain length, guarding against delegation cycles and
/// runaway graphs.
pub const MAX_PROOF_DEPTH: usize = 8;

/// Resolve a proof chain authorizing `invoker` to run `command` over
/// `subject`.
///
/// Chains are discovered breadth-first, so a shortest chain wins.
/// Expired delegations are skipped. The returned chain is ordered from
/// the root (issued by the subject) to the leaf (granted to the
/// invoker); an empty result means no authorization exists — the
/// caller's precondition failure, not an error.
///
/// # Errors
///
/// Returns a [`StoreError`] when the underlying store fails; absence of
/// a chain is not an error.
pub async fn resolve_proof_chain<B>(
    store: &DelegationStore<B>,
    invoker: &Did,
    command: &Command,
    subject: &Did,
) -> Result<Vec<(Cid, Delegation)>, StoreError>
where
    B: StorageBackend<Key = String, Value = Vec<u8>> + StorageScan,
{
    debug!(invoker = %invoker, cmd = %command, subject = %subject, "resolving proof chain");

    // Each frontier entry is a partial chain, leaf (granted to the
    // invoker) first.
    let mut frontier: VecDeque<Vec<(Cid, Delegation)>> = VecDeque::from([Vec::new()]);
    let mut visited: HashSet<Did> = HashSet::from([invoker.clone()]);

    while let Some(partial) = frontier.pop_front() {
        if partial.len() >= MAX_PROOF_DEPTH {
            continue;
        }
        let audience = partial
            .last()
            .map_or(invoker, |(_, delegation)| delegation.issuer());

        let candidates = store.find(audience, command, Some(subject));
        pin_mut!(candidates);
        while let Some((link, delegation)) = candidates.try_next().await? {
            if delegation.is_expired() {
                continue;
            }
            let issuer = delegation.issuer().clone();
            let mut chain = partial.clone();
            chain.push((link, delegation));

            if &issuer == subject {
                // Root reached: reorder root-to-leaf.
                chain.reverse();
                debug!(length = chain.len(), "proof chain resolved");
                return Ok(chain);
            }
            if visited.insert(issuer) {
                frontier.push_back(chain);
            }
        }
    }

    debug!("no proof chain found");
    Ok(Vec::new())
}
