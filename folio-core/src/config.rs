//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigError, FolioResult};

/// Default time-to-live for cached entries: 7 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default maximum number of concurrently running background jobs.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

/// Configuration for the cache orchestrator and its background machinery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied to new entries unless a put overrides it.
    pub default_ttl: Duration,

    /// Maximum number of background jobs running at once (WorkQueue cap).
    pub max_concurrent_jobs: usize,

    /// Whether per-operation debug logging is emitted.
    pub log_operations: bool,

    /// Optional per-collection size budget for capacity sweeps, in bytes.
    /// `None` disables capacity-based eviction.
    pub max_collection_bytes: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            log_operations: false,
            max_collection_bytes: None,
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the background-job concurrency cap.
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Enable or disable per-operation logging.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_operations = enabled;
        self
    }

    /// Set the per-collection capacity budget.
    pub fn with_max_collection_bytes(mut self, budget: u64) -> Self {
        self.max_collection_bytes = Some(budget);
        self
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// # Environment Variables
    /// - `FOLIO_CACHE_TTL_SECS`: default entry TTL in seconds (default: 604800)
    /// - `FOLIO_CACHE_MAX_JOBS`: background-job concurrency cap (default: 3)
    /// - `FOLIO_CACHE_LOG_OPS`: per-operation logging (default: false)
    /// - `FOLIO_CACHE_MAX_COLLECTION_BYTES`: capacity budget (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let default_ttl = std::env::var("FOLIO_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.default_ttl);

        let max_concurrent_jobs = std::env::var("FOLIO_CACHE_MAX_JOBS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_concurrent_jobs);

        let log_operations = std::env::var("FOLIO_CACHE_LOG_OPS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.log_operations);

        let max_collection_bytes = std::env::var("FOLIO_CACHE_MAX_COLLECTION_BYTES")
            .ok()
            .and_then(|s| s.parse().ok());

        Self {
            default_ttl,
            max_concurrent_jobs,
            log_operations,
            max_collection_bytes,
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - `default_ttl` is positive
    /// - `max_concurrent_jobs` is greater than 0
    /// - `max_collection_bytes`, when set, is greater than 0
    pub fn validate(&self) -> FolioResult<()> {
        if self.default_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "default_ttl".to_string(),
                value: format!("{:?}", self.default_ttl),
                reason: "default_ttl must be positive".to_string(),
            }
            .into());
        }

        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_jobs".to_string(),
                value: self.max_concurrent_jobs.to_string(),
                reason: "max_concurrent_jobs must be greater than 0".to_string(),
            }
            .into());
        }

        if let Some(budget) = self.max_collection_bytes {
            if budget == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "max_collection_bytes".to_string(),
                    value: budget.to_string(),
                    reason: "capacity budget must be greater than 0".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}
