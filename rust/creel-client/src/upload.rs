//! The upload saga.
//!
//! A single [`UploadOrchestrator::upload`] call walks the whole
//! protocol: digest, proof resolution, the `/blob/add` invocation, the
//! conditional physical transfer, the transfer receipt, and the poll for
//! the location commitment. Every step aborts the saga on first error;
//! only the receipt poll retries, inside [`ReceiptClient`]. The saga
//! keeps no checkpoint — both the invocation and the transfer are keyed
//! by content digest, so re-running it from scratch after an
//! interruption is safe.

use creel_storage::{StorageBackend, StorageScan};
use creel_ucan::{
    Command, Delegation, Did, Ed25519Signer, Invocation, Predicate, Receipt, Subject, Timestamp,
    codec::CodecError,
    envelope::BuildError,
    receipt::Outcome,
    signer::Principal,
};
use ipld_core::{cid::Cid, ipld::Ipld};
use serde::{Serialize, de::DeserializeOwned};
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
    blob::{self, AcceptOk, AddArguments, AddOk, AllocateOk, Blob, BlobDigest, LocationArguments},
    channel::{BlobTransport, Channel, ChannelError, ExecutionRequest, ServiceConfig},
    proof::resolve_proof_chain,
    receipt::{ReceiptClient, ReceiptEndpoint, ReceiptError},
    store::{DelegationStore, StoreError},
};

/// Validity window of the `/blob/allocate` and `/blob/accept`
/// sub-delegations minted per upload.
const SUBTASK_TTL: Duration = Duration::from_secs(15 * 60);

/// Composes the delegation store, the execution channel, the blob
/// transport and the receipt poller into the end-to-end upload saga.
pub struct UploadOrchestrator<B, C, T, E, P> {
    identity: Ed25519Signer,
    service: ServiceConfig,
    store: DelegationStore<B>,
    channel: C,
    transport: T,
    receipts: ReceiptClient<E>,
    progress: P,
}

/// The saga's result: where the content ended up.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// The content digest of the uploaded bytes.
    pub digest: BlobDigest,

    /// The size of the uploaded bytes.
    pub size: u64,

    /// Whether the physical transfer was skipped because the provider
    /// already held the content.
    pub skipped: bool,

    /// The provider that holds the content.
    pub provider: Did,

    /// The physical URLs the content is retrievable from.
    pub locations: Vec<Url>,

    /// The content identifier of the blob.
    pub content: Cid,
}

/// Human-facing progress notifications emitted while the saga runs.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// The input was digested.
    Digested {
        /// The content digest.
        digest: BlobDigest,
        /// The input size in bytes.
        size: u64,
    },

    /// The provider already holds the content; no transfer needed.
    AlreadyStored {
        /// The provider holding the content.
        provider: Did,
        /// The content digest.
        digest: BlobDigest,
    },

    /// The bytes are being transferred.
    Uploading {
        /// The provider receiving the content.
        provider: Did,
        /// The content digest.
        digest: BlobDigest,
        /// The write address.
        url: Url,
    },

    /// A completion receipt for the transfer is being submitted.
    SubmittingReceipt,

    /// Waiting for the acceptance task to complete.
    AwaitingAcceptance {
        /// The acceptance task polled for.
        task: Cid,
    },

    /// The network committed the content to physical locations.
    LocationCommitted {
        /// The location-commitment invocation.
        commitment: Cid,
        /// The committed URLs.
        locations: Vec<Url>,
    },
}

/// Receives [`UploadEvent`]s. Passed in explicitly at construction; the
/// orchestrator never prints on its own.
pub trait ProgressSink {
    /// Handle one progress event.
    fn emit(&self, event: UploadEvent);
}

/// A [`ProgressSink`] that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: UploadEvent) {}
}

impl<B, C, T, E, P> UploadOrchestrator<B, C, T, E, P>
where
    B: StorageBackend<Key = String, Value = Vec<u8>> + StorageScan + Send + Sync,
    C: Channel + Send + Sync,
    T: BlobTransport + Send + Sync,
    E: ReceiptEndpoint + Send + Sync,
    P: ProgressSink + Send + Sync,
{
    /// Assemble an orchestrator from its collaborators.
    pub fn new(
        identity: Ed25519Signer,
        service: ServiceConfig,
        store: DelegationStore<B>,
        channel: C,
        transport: T,
        receipts: ReceiptClient<E>,
        progress: P,
    ) -> Self {
        Self {
            identity,
            service,
            store,
            channel,
            transport,
            receipts,
            progress,
        }
    }

    /// Upload `data` into `space`, returning once the network has
    /// committed a retrievable location for it.
    ///
    /// # Errors
    ///
    /// Returns an [`UploadError`] attributing the failing step; see the
    /// variant docs for the taxonomy.
    pub async fn upload(&self, space: &Did, data: &[u8]) -> Result<UploadOutcome, UploadError> {
        let digest = BlobDigest::digest(data);
        let size = data.len() as u64;
        self.progress.emit(UploadEvent::Digested {
            digest: digest.clone(),
            size,
        });

        let add_command = blob::add_command();
        let chain = resolve_proof_chain(&self.store, self.identity.did(), &add_command, space)
            .await?;
        if chain.is_empty() {
            return Err(UploadError::NotAuthorized {
                command: add_command,
                space: space.clone(),
            });
        }

        let (proof_links, proofs): (Vec<Cid>, Vec<Delegation>) = chain.into_iter().unzip();
        let invocation = Invocation::builder()
            .issuer(self.identity.clone())
            .audience(self.service.id.clone())
            .subject(space.clone())
            .command(add_command.clone())
            .arguments(to_args_map(&AddArguments {
                blob: Blob {
                    digest: digest.clone(),
                    size,
                },
            })?)
            .proofs(proof_links)
            .try_build()?;
        let task = invocation.to_link()?;

        // Scope the service's authority over the derived tasks to
        // exactly this digest and size.
        // TODO: resolve proof chains for these sub-delegations too; for
        // now the chain above suffices because the invoker holds top
        // authority over spaces it created.
        let policy = vec![Predicate::And(vec![
            Predicate::equal(".blob.digest", Ipld::Bytes(digest.to_multihash_bytes()))?,
            Predicate::equal(".blob.size", i128::from(size))?,
        ])];
        let allocate = self.subtask_delegation(space, blob::allocate_command(), policy.clone())?;
        let accept = self.subtask_delegation(space, blob::accept_command(), policy)?;

        info!(task = %task, digest = %digest, "invoking /blob/add");
        let request = ExecutionRequest::invoke(&invocation, &proofs, &[allocate, accept])?;
        let response = self.channel.execute(request).await?;

        let add_receipt = response
            .receipt_for_task(&task)
            .ok_or_else(|| protocol("missing receipt for the /blob/add task"))?;
        let add_ok: AddOk = decode_outcome(add_receipt.out(), &add_command)?;

        // The allocation outcome rides along in the response metadata,
        // attached to the service's own /blob/allocate sub-invocation.
        let allocate_command = blob::allocate_command();
        let allocate_invocation = response
            .find_invocation(&allocate_command)
            .ok_or_else(|| protocol("missing /blob/allocate invocation in response"))?;
        let allocate_receipt = response
            .receipt_for_task(&allocate_invocation.to_link()?)
            .ok_or_else(|| protocol("missing /blob/allocate receipt in response"))?;
        let allocate_ok: AllocateOk = decode_outcome(allocate_receipt.out(), &allocate_command)?;
        let provider = allocate_receipt.issuer().clone();

        let skipped = match allocate_ok.address {
            None => {
                debug!(provider = %provider, "content already present, skipping transfer");
                self.progress.emit(UploadEvent::AlreadyStored {
                    provider: provider.clone(),
                    digest: digest.clone(),
                });
                true
            }
            Some(address) => {
                self.progress.emit(UploadEvent::Uploading {
                    provider: provider.clone(),
                    digest: digest.clone(),
                    url: address.url.clone(),
                });
                self.transport.put(&address, data).await?;

                // The storage provider is a short-lived delegate, not
                // the upload service itself; it hands us its signing key
                // inside the /http/put sub-invocation so we can complete
                // that task on its behalf.
                let put_command = blob::http_put_command();
                let put_invocation = response
                    .find_invocation(&put_command)
                    .ok_or_else(|| protocol("missing /http/put invocation in response"))?;
                let provider_signer = extract_provider_key(put_invocation)?;
                let put_receipt =
                    Receipt::issue(&provider_signer, put_invocation.to_link()?, Outcome::ok_empty())?;

                self.progress.emit(UploadEvent::SubmittingReceipt);
                info!(task = %put_invocation.to_link()?, "submitting /http/put receipt");
                self.channel
                    .execute(ExecutionRequest::submit_receipt(&put_receipt)?)
                    .await?;
                false
            }
        };

        let accept_task = add_ok.site.task;
        self.progress
            .emit(UploadEvent::AwaitingAcceptance { task: accept_task });
        let bundle = self.receipts.poll(&accept_task).await?;

        let accept_command = blob::accept_command();
        let accept_receipt = bundle
            .receipt_for_task(&accept_task)
            .ok_or_else(|| protocol("polled bundle is missing the /blob/accept receipt"))?;
        let accept_ok: AcceptOk = decode_outcome(accept_receipt.out(), &accept_command)?;

        let commitment = bundle
            .invocation_with_link(&accept_ok.site)
            .ok_or_else(|| protocol("missing location commitment"))?;
        let location: LocationArguments =
            from_ipld(commitment.arguments_ipld(), "location commitment arguments")?;

        self.progress.emit(UploadEvent::LocationCommitted {
            commitment: accept_ok.site,
            locations: location.location.clone(),
        });
        info!(digest = %digest, space = %space, "upload complete");

        Ok(UploadOutcome {
            content: digest.content_link(),
            digest,
            size,
            skipped,
            provider,
            locations: location.location,
        })
    }

    fn subtask_delegation(
        &self,
        space: &Did,
        command: Command,
        policy: Vec<Predicate>,
    ) -> Result<Delegation, UploadError> {
        Ok(Delegation::builder()
            .issuer(self.identity.clone())
            .audience(self.service.id.clone())
            .subject(Subject::Specific(space.clone()))
            .command(command)
            .policy(policy)
            .expiration(Timestamp::from_now(SUBTASK_TTL))
            .try_build()?)
    }
}

/// Extract the blob provider's signing key from the `/http/put`
/// invocation metadata.
fn extract_provider_key(invocation: &Invocation) -> Result<Ed25519Signer, UploadError> {
    let keys = invocation
        .meta()
        .get("keys")
        .ok_or_else(|| protocol("missing 'keys' metadata"))?;
    let Ipld::Map(keys) = keys else {
        return Err(protocol("invalid 'keys' metadata: not a map"));
    };
    let issuer = invocation.issuer();
    let key = keys.get(issuer.as_str()).ok_or_else(|| {
        protocol(format!("missing private key for {issuer} in 'keys' metadata"))
    })?;
    let Ipld::Bytes(key) = key else {
        return Err(protocol(format!(
            "invalid private key for {issuer} in 'keys' metadata: not bytes"
        )));
    };
    Ed25519Signer::import(key).map_err(|e| {
        protocol(format!("invalid private key for {issuer} in 'keys' metadata: {e}"))
    })
}

/// Decode the success value of a task outcome into its typed shape; a
/// failed outcome becomes [`UploadError::TaskFailed`].
fn decode_outcome<O: DeserializeOwned>(out: &Outcome, command: &Command) -> Result<O, UploadError> {
    match out {
        Outcome::Ok(value) => from_ipld(value.clone(), &format!("{command} outcome")),
        Outcome::Err(detail) => Err(UploadError::TaskFailed {
            command: command.clone(),
            detail: format!("{detail:?}"),
        }),
    }
}

fn from_ipld<O: DeserializeOwned>(value: Ipld, what: &str) -> Result<O, UploadError> {
    ipld_core::serde::from_ipld(value).map_err(|e| protocol(format!("malformed {what}: {e}")))
}

fn to_args_map<A: Serialize>(arguments: &A) -> Result<BTreeMap<String, Ipld>, UploadError> {
    let ipld = ipld_core::serde::to_ipld(arguments)
        .map_err(|e| UploadError::Codec(CodecError::Encode(e.to_string())))?;
    let Ipld::Map(map) = ipld else {
        return Err(UploadError::Codec(CodecError::Encode(
            "invocation arguments must encode to a map".to_string(),
        )));
    };
    Ok(map)
}

fn protocol(message: impl Into<String>) -> UploadError {
    UploadError::Protocol(message.into())
}

/// Everything that can abort the upload saga.
#[derive(Debug, Error)]
pub enum UploadError {
    /// No delegation chain authorizes the upload — a precondition
    /// failure, not retryable.
    #[error("missing \"{command}\" delegations for space: {space}")]
    NotAuthorized {
        /// The command no chain was found for.
        command: Command,
        /// The target space.
        space: Did,
    },

    /// A remote task reported a failed outcome.
    #[error("failed \"{command}\" task: {detail}")]
    TaskFailed {
        /// The failed task's command.
        command: Command,
        /// The error value the task reported.
        detail: String,
    },

    /// A collaborator violated the protocol contract — a response was
    /// missing an expected invocation, receipt or key. Always terminal.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The physical transfer was rejected.
    #[error("upload failed with status {status}: {body}")]
    TransferFailed {
        /// The HTTP status of the PUT response.
        status: u16,
        /// The PUT response body, for diagnostics.
        body: String,
    },

    /// The execution channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Receipt polling failed or timed out.
    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    /// The delegation store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A token failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A token could not be built or signed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A policy predicate could not be constructed.
    #[error(transparent)]
    Policy(#[from] creel_ucan::policy::PolicyError),
}
