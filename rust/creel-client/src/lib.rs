#![warn(missing_docs)]

//! Client-side machinery for the creel capability network.
//!
//! Two pieces do the heavy lifting here:
//!
//! - [`DelegationStore`] — a durable, doubly-indexed store of
//!   authorization delegations, queryable by content link and by
//!   `(audience, command, subject)` prefix.
//! - [`UploadOrchestrator`] — the client-driven saga that invokes the
//!   remote `/blob/add` capability, performs the physical transfer when
//!   one is needed, acknowledges it with a receipt, and polls until the
//!   network commits a retrievable location for the content.
//!
//! Everything between them — proof-chain resolution, the execution
//! channel, the receipt poller — composes through explicit constructor
//! arguments; there is no ambient wiring.

pub mod blob;
pub mod channel;
pub mod proof;
pub mod receipt;
pub mod store;
pub mod upload;

pub use blob::BlobDigest;
pub use channel::{
    BlobTransport, Channel, ExecutionRequest, ExecutionResponse, HttpBlobTransport, HttpChannel,
    ServiceConfig,
};
pub use proof::resolve_proof_chain;
pub use receipt::{HttpReceiptEndpoint, PollConfig, ReceiptClient, ReceiptEndpoint};
pub use store::{DelegationStore, StoreError};
pub use upload::{ProgressSink, UploadError, UploadEvent, UploadOrchestrator, UploadOutcome};
