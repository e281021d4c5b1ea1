#![warn(missing_docs)]

//! This crate contains a generalized API for durable key-value storage
//! from different backends.
//!
//! Select or implement a [StorageBackend]; backends with string keys and
//! byte values additionally support ordered prefix scans via
//! [StorageScan], which is what the delegation index is built on.
//!
//! ```rust
//! use creel_storage::MemoryStorageBackend;
//!
//! // An in-memory storage backend with explicit types
//! let backend = MemoryStorageBackend::<String, Vec<u8>>::default();
//! ```

mod backend;
pub use backend::*;

mod error;
pub use error::*;
