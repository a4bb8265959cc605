//! Backing-store abstraction and implementations.
//!
//! The cache treats the persistent key-value box as an external
//! collaborator: an opaque store exposing get/put/delete/clear over named
//! collections. [`LmdbStore`] is the on-device implementation;
//! [`MemoryStore`] backs tests and ephemeral sessions.

pub mod lmdb;
pub mod memory;
pub mod traits;

pub use lmdb::{LmdbStore, LmdbStoreError};
pub use memory::MemoryStore;
pub use traits::KeyValueStore;
