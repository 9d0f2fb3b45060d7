//! Configuration for the sync subsystem.
//!
//! # Example
//!
//! ```
//! use civic_sync::SyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.read_cache_capacity, 1000);
//! assert_eq!(config.request_timeout_ms, 10_000);
//!
//! // Full config
//! let config = SyncConfig {
//!     read_cache_capacity: 500,
//!     list_cache_ttl_ms: 10 * 60 * 1000, // 10 minutes
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the store, queue and sync engine.
///
/// All fields have sensible defaults. The defaults match the behavior of
/// the mobile client this subsystem was extracted from.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Max entries held by the in-process read cache (default: 1000)
    #[serde(default = "default_read_cache_capacity")]
    pub read_cache_capacity: usize,

    /// Per-call timeout for remote requests in milliseconds (default: 10s)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Max attempts per remote call within a single sync run (default: 3)
    #[serde(default = "default_remote_retry_attempts")]
    pub remote_retry_attempts: usize,

    /// Initial backoff delay between remote retries in ms (default: 100)
    #[serde(default = "default_remote_retry_initial_ms")]
    pub remote_retry_initial_ms: u64,

    /// Backoff delay cap in ms (default: 2s)
    #[serde(default = "default_remote_retry_max_ms")]
    pub remote_retry_max_ms: u64,

    /// TTL for the cached violations list in ms (default: 1 hour)
    #[serde(default = "default_list_cache_ttl_ms")]
    pub list_cache_ttl_ms: u64,

    /// TTL for cached auth tokens in ms (default: 30 days)
    #[serde(default = "default_auth_token_ttl_ms")]
    pub auth_token_ttl_ms: u64,

    /// Interval between expired-entry sweeps in seconds (default: 15 min)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_read_cache_capacity() -> usize { 1000 }
fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_remote_retry_attempts() -> usize { 3 }
fn default_remote_retry_initial_ms() -> u64 { 100 }
fn default_remote_retry_max_ms() -> u64 { 2_000 }
fn default_list_cache_ttl_ms() -> u64 { 60 * 60 * 1000 }
fn default_auth_token_ttl_ms() -> u64 { 30 * 24 * 60 * 60 * 1000 }
fn default_cleanup_interval_secs() -> u64 { 15 * 60 }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            read_cache_capacity: default_read_cache_capacity(),
            request_timeout_ms: default_request_timeout_ms(),
            remote_retry_attempts: default_remote_retry_attempts(),
            remote_retry_initial_ms: default_remote_retry_initial_ms(),
            remote_retry_max_ms: default_remote_retry_max_ms(),
            list_cache_ttl_ms: default_list_cache_ttl_ms(),
            auth_token_ttl_ms: default_auth_token_ttl_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}
