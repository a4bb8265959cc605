//! Folio Core - Cache Data Types
//!
//! Pure data structures for the Folio cache subsystem. All other crates
//! depend on this. This crate contains only value types and their derived
//! queries - no I/O, no async, no business logic.

use chrono::{DateTime, Utc};

pub mod config;
pub mod error;
pub mod keys;
pub mod metadata;
pub mod result;

pub use config::{CacheConfig, DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_TTL};
pub use error::{ConfigError, FolioError, FolioResult, QueueError, StoreError};
pub use metadata::{CacheMetadata, DataSource};
pub use result::CacheResult;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
