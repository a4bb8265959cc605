//! Tagged result of a cache operation.
//!
//! Every cache read resolves to a `CacheResult<T>`: callers branch on the
//! status instead of catching exceptions, and stale/loading/error states
//! can still carry the previously cached payload so the UI can show stale
//! content while a refresh is in flight.

use crate::error::FolioError;
use crate::metadata::CacheMetadata;

/// Outcome of a cache lookup or mutation, with optional payload.
///
/// Invariants: `Fresh` always carries data, `Missing` never does.
/// Provenance (`DataSource`) lives on the metadata and is orthogonal to
/// this status; UI-facing distinctions are projections of these variants,
/// not separate state.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Cached data within TTL, usable without revalidation.
    Fresh { data: T, metadata: CacheMetadata },

    /// Cached data past TTL, still displayable pending refresh.
    Stale {
        data: T,
        metadata: CacheMetadata,
        error: Option<FolioError>,
    },

    /// A fetch or refresh is in flight; previous data may be shown.
    Loading {
        previous_data: Option<T>,
        previous_metadata: Option<CacheMetadata>,
    },

    /// The operation failed; previous data may still be shown.
    Error {
        error: FolioError,
        previous_data: Option<T>,
        previous_metadata: Option<CacheMetadata>,
    },

    /// Nothing cached under the key. Carries the triggering error when the
    /// miss was caused by a corrupt record rather than true absence.
    Missing { error: Option<FolioError> },
}

impl<T> CacheResult<T> {
    /// Fresh data with its metadata snapshot.
    pub fn fresh(data: T, metadata: CacheMetadata) -> Self {
        Self::Fresh { data, metadata }
    }

    /// Expired-but-present data, optionally with the error that kept it
    /// from being refreshed.
    pub fn stale(data: T, metadata: CacheMetadata, error: Option<FolioError>) -> Self {
        Self::Stale {
            data,
            metadata,
            error,
        }
    }

    /// An in-flight fetch, optionally carrying the previous snapshot.
    pub fn loading(previous_data: Option<T>, previous_metadata: Option<CacheMetadata>) -> Self {
        Self::Loading {
            previous_data,
            previous_metadata,
        }
    }

    /// A failed operation, optionally carrying the previous snapshot.
    pub fn error(
        error: FolioError,
        previous_data: Option<T>,
        previous_metadata: Option<CacheMetadata>,
    ) -> Self {
        Self::Error {
            error,
            previous_data,
            previous_metadata,
        }
    }

    /// Nothing cached. `error` distinguishes a corrupt-record miss from a
    /// plain absent key.
    pub fn missing(error: Option<FolioError>) -> Self {
        Self::Missing { error }
    }

    /// Whether any payload (current or previous) is available.
    pub fn has_data(&self) -> bool {
        self.data().is_some()
    }

    /// Whether this is a fresh hit.
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }

    /// Whether the payload came from the cache (fresh or stale).
    pub fn is_from_cache(&self) -> bool {
        matches!(self, Self::Fresh { .. } | Self::Stale { .. })
    }

    /// Whether an error is attached to this result.
    pub fn has_error(&self) -> bool {
        self.error_ref().is_some()
    }

    /// Whether nothing is cached under the key.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }

    /// Whether a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// The available payload, current or previous.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Fresh { data, .. } | Self::Stale { data, .. } => Some(data),
            Self::Loading { previous_data, .. } | Self::Error { previous_data, .. } => {
                previous_data.as_ref()
            }
            Self::Missing { .. } => None,
        }
    }

    /// The available metadata snapshot, current or previous.
    pub fn metadata(&self) -> Option<&CacheMetadata> {
        match self {
            Self::Fresh { metadata, .. } | Self::Stale { metadata, .. } => Some(metadata),
            Self::Loading {
                previous_metadata, ..
            }
            | Self::Error {
                previous_metadata, ..
            } => previous_metadata.as_ref(),
            Self::Missing { .. } => None,
        }
    }

    /// The attached error, if any.
    pub fn error_ref(&self) -> Option<&FolioError> {
        match self {
            Self::Stale { error, .. } | Self::Missing { error } => error.as_ref(),
            Self::Error { error, .. } => Some(error),
            Self::Fresh { .. } | Self::Loading { .. } => None,
        }
    }

    /// Transform the payload type, preserving status, error and metadata.
    ///
    /// A result with no data maps to a result of the new type with no data;
    /// `f` is simply never called.
    pub fn map<R>(self, f: impl FnOnce(T) -> R) -> CacheResult<R> {
        match self {
            Self::Fresh { data, metadata } => CacheResult::Fresh {
                data: f(data),
                metadata,
            },
            Self::Stale {
                data,
                metadata,
                error,
            } => CacheResult::Stale {
                data: f(data),
                metadata,
                error,
            },
            Self::Loading {
                previous_data,
                previous_metadata,
            } => CacheResult::Loading {
                previous_data: previous_data.map(f),
                previous_metadata,
            },
            Self::Error {
                error,
                previous_data,
                previous_metadata,
            } => CacheResult::Error {
                error,
                previous_data: previous_data.map(f),
                previous_metadata,
            },
            Self::Missing { error } => CacheResult::Missing { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn make_meta() -> CacheMetadata {
        CacheMetadata::new("b1", "books_cache")
    }

    fn make_error() -> FolioError {
        FolioError::Store(StoreError::TransactionFailed {
            reason: "mdb".to_string(),
        })
    }

    #[test]
    fn test_fresh_carries_data() {
        let result = CacheResult::fresh(7i32, make_meta());
        assert!(result.is_fresh());
        assert!(result.is_from_cache());
        assert!(result.has_data());
        assert!(!result.has_error());
        assert_eq!(result.data(), Some(&7));
        assert!(result.metadata().is_some());
    }

    #[test]
    fn test_stale_carries_data_and_optional_error() {
        let result = CacheResult::stale("old".to_string(), make_meta(), Some(make_error()));
        assert!(!result.is_fresh());
        assert!(result.is_from_cache());
        assert!(result.has_data());
        assert!(result.has_error());
    }

    #[test]
    fn test_missing_has_no_data_no_error() {
        let result: CacheResult<String> = CacheResult::missing(None);
        assert!(result.is_missing());
        assert!(!result.has_data());
        assert!(!result.has_error());
        assert!(result.data().is_none());
        assert!(result.metadata().is_none());
    }

    #[test]
    fn test_loading_may_carry_previous_snapshot() {
        let result = CacheResult::loading(Some(3u8), Some(make_meta()));
        assert!(result.is_loading());
        assert!(result.has_data());
        assert!(!result.has_error());

        let empty: CacheResult<u8> = CacheResult::loading(None, None);
        assert!(empty.is_loading());
        assert!(!empty.has_data());
    }

    #[test]
    fn test_error_keeps_previous_data() {
        let result = CacheResult::error(make_error(), Some(11u32), Some(make_meta()));
        assert!(result.has_error());
        assert!(result.has_data());
        assert!(!result.is_from_cache());
    }

    #[test]
    fn test_map_transforms_only_data() {
        let meta = make_meta();
        let result = CacheResult::stale(21i64, meta.clone(), Some(make_error()));
        let mapped = result.map(|n| n.to_string());

        match mapped {
            CacheResult::Stale {
                data,
                metadata,
                error,
            } => {
                assert_eq!(data, "21");
                assert_eq!(metadata, meta);
                assert!(error.is_some());
            }
            other => panic!("expected Stale, got {:?}", other),
        }
    }

    #[test]
    fn test_map_on_no_data_result() {
        let missing: CacheResult<i32> = CacheResult::missing(Some(make_error()));
        let mapped: CacheResult<String> = missing.map(|n| n.to_string());
        assert!(mapped.is_missing());
        assert!(mapped.has_error());
        assert!(!mapped.has_data());

        let loading: CacheResult<i32> = CacheResult::loading(None, Some(make_meta()));
        let mapped: CacheResult<String> = loading.map(|n| n.to_string());
        assert!(mapped.is_loading());
        assert!(mapped.metadata().is_some());
        assert!(!mapped.has_data());
    }
}
