//! UCAN authorization tokens.
//!
//! This crate provides the capability-protocol primitives consumed by the
//! creel client: DIDs and ed25519 signers, hierarchical commands, policy
//! predicates, and the three signed token kinds — [`Delegation`],
//! [`Invocation`] and [`Receipt`] — together with their DAG-CBOR wire form
//! and content-derived [CID](ipld_core::cid::Cid) links.
//!
//! Tokens are exchanged in [containers](container::Container): DAG-CBOR
//! maps of the shape `{ "ctn-v1": [token_bytes, ...] }`.

pub mod codec;
pub mod command;
pub mod container;
pub mod delegation;
pub mod did;
pub mod envelope;
pub mod invocation;
pub mod nonce;
pub mod policy;
pub mod receipt;
pub mod signer;
pub mod subject;
pub mod time;

pub use command::Command;
pub use delegation::Delegation;
pub use did::Did;
pub use invocation::Invocation;
pub use nonce::Nonce;
pub use policy::Predicate;
pub use receipt::{Outcome, Receipt};
pub use signer::{Ed25519Signer, Principal};
pub use subject::Subject;
pub use time::Timestamp;
