// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Expiring key-value store.
//!
//! The [`KvStore`] is the single owner of durable persistence. Everything
//! else in this crate (the pending-change queue, the violations cache,
//! the sync engine's bookkeeping) stores its state *through* it, under
//! reserved key namespaces (see [`crate::keys`]).
//!
//! Reads are served from a bounded in-process cache when possible and
//! fall back to the durable backend. Every persisted value is wrapped in
//! an envelope carrying write time, optional TTL, the transform steps
//! applied to the payload, and a checksum.
//!
//! # Read semantics
//!
//! `get` is tri-state: `Ok(Some(v))`, `Ok(None)` or `Err(_)`. An expired
//! entry reads as absent and is purged from cache and backend on the
//! way out. A corrupt entry (checksum mismatch, undecodable envelope or
//! payload) also reads as absent and is evicted on detection instead of
//! failing the same way on every subsequent read.
//!
//! # Write semantics
//!
//! Each `set`/`remove` is one atomic backend call; truly concurrent
//! writes to the same key resolve to last-write-wins, never to an
//! interleaved value. Reads never observe a torn write.

mod backend;
mod envelope;
mod memory;
mod read_cache;
mod sqlite;

pub use backend::{StorageBackend, StoreError};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

pub(crate) use envelope::now_millis;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::transform::{self, TransformKind};

use envelope::StoredEntry;
use read_cache::{CachedValue, ReadCache};

/// Options for a [`KvStore::set`] call.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Time-to-live in milliseconds; `None` means the entry never expires
    pub expiry_ms: Option<u64>,
    /// Transform pipeline applied to the payload, in order
    pub transforms: Vec<TransformKind>,
}

impl SetOptions {
    /// Plain storage, no TTL, no transforms.
    #[must_use]
    pub fn plain() -> Self {
        Self::default()
    }

    /// Plain storage with a TTL.
    #[must_use]
    pub fn ttl(expiry_ms: u64) -> Self {
        Self { expiry_ms: Some(expiry_ms), transforms: Vec::new() }
    }

    /// Add a transform step to the end of the pipeline.
    #[must_use]
    pub fn with_transform(mut self, kind: TransformKind) -> Self {
        self.transforms.push(kind);
        self
    }
}

/// Durable, namespaced storage with optional TTL and a bounded
/// in-process read cache.
///
/// Construct one per process and hand out `Arc<KvStore>` clones; there
/// are no module-level singletons.
pub struct KvStore {
    backend: Arc<dyn StorageBackend>,
    cache: ReadCache,
}

impl KvStore {
    /// Default read-cache capacity.
    pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_capacity(backend, Self::DEFAULT_CACHE_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(backend: Arc<dyn StorageBackend>, cache_capacity: usize) -> Self {
        Self { backend, cache: ReadCache::new(cache_capacity) }
    }

    /// Store a value under `key`.
    ///
    /// The value is serialized, run through the transform pipeline (a
    /// failing step is skipped, not fatal), wrapped in an envelope and
    /// persisted, then written through to the read cache.
    pub async fn set<T>(&self, key: &str, value: &T, options: &SetOptions) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        let plain = serde_json::to_string(value)?;
        let (payload, applied) =
            transform::apply_pipeline(&options.transforms, plain.clone());
        let entry = StoredEntry::new(key.to_string(), payload, options.expiry_ms, applied);
        let serialized = serde_json::to_string(&entry)?;

        if let Err(e) = self.backend.set(key, &serialized).await {
            crate::metrics::record_store_write("error");
            return Err(e);
        }

        self.cache.insert(key, CachedValue { json: plain, expires_at: entry.expires_at });
        crate::metrics::record_store_write("success");
        debug!(key = %key, ttl_ms = ?options.expiry_ms, "Stored entry");
        Ok(())
    }

    /// Read a value by key.
    ///
    /// Returns `Ok(None)` for absent, expired and corrupt entries; the
    /// latter two are purged as a side effect. The reverse transform
    /// pipeline is derived from the envelope, not from caller options,
    /// so readers cannot get it wrong.
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        if let Some(hit) = self.cache.get(key) {
            if matches!(hit.expires_at, Some(at) if at <= now_millis()) {
                self.purge(key).await;
                crate::metrics::record_store_read("expired");
                debug!(key = %key, "Cache hit was expired, purged");
                return Ok(None);
            }
            match serde_json::from_str(&hit.json) {
                Ok(value) => {
                    crate::metrics::record_store_read("hit");
                    return Ok(Some(value));
                }
                Err(_) => {
                    // Cached shape doesn't match the requested type;
                    // fall through to the durable read
                    self.cache.remove(key);
                }
            }
        }

        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                crate::metrics::record_store_read("miss");
                return Ok(None);
            }
            Err(e) => {
                crate::metrics::record_store_read("error");
                return Err(e);
            }
        };

        let entry: StoredEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable stored entry, evicting");
                crate::metrics::record_corruption(key);
                self.purge(key).await;
                crate::metrics::record_store_read("corrupt");
                return Ok(None);
            }
        };

        if entry.is_expired() {
            self.purge(key).await;
            crate::metrics::record_store_read("expired");
            debug!(key = %key, "Entry expired, purged");
            return Ok(None);
        }

        if !entry.checksum_ok() {
            warn!(key = %key, "Checksum mismatch, evicting corrupt entry");
            crate::metrics::record_corruption(key);
            self.purge(key).await;
            crate::metrics::record_store_read("corrupt");
            return Ok(None);
        }

        let plain = transform::reverse_pipeline(&entry.applied, entry.payload);

        match serde_json::from_str(&plain) {
            Ok(value) => {
                self.cache
                    .insert(key, CachedValue { json: plain, expires_at: entry.expires_at });
                crate::metrics::record_store_read("hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable payload, evicting");
                crate::metrics::record_corruption(key);
                self.purge(key).await;
                crate::metrics::record_store_read("corrupt");
                Ok(None)
            }
        }
    }

    /// Delete `key` from cache and backend. Removing an absent key is
    /// not an error.
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.cache.remove(key);
        self.backend.remove(key).await
    }

    /// Batch `set`. Items are processed independently: one failure does
    /// not abort the batch, and each item's outcome is reported.
    pub async fn multi_set<T>(
        &self,
        pairs: &[(&str, T)],
        options: &SetOptions,
    ) -> Vec<(String, Result<(), StoreError>)>
    where
        T: Serialize,
    {
        let mut results = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let outcome = self.set(key, value, options).await;
            results.push((key.to_string(), outcome));
        }
        results
    }

    /// Batch `get` with per-item outcomes.
    pub async fn multi_get<T>(&self, keys: &[&str]) -> Vec<(String, Result<Option<T>, StoreError>)>
    where
        T: DeserializeOwned,
    {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let outcome = self.get(key).await;
            results.push((key.to_string(), outcome));
        }
        results
    }

    /// Batch `remove` with per-item outcomes.
    pub async fn multi_remove(&self, keys: &[&str]) -> Vec<(String, Result<(), StoreError>)> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let outcome = self.remove(key).await;
            results.push((key.to_string(), outcome));
        }
        results
    }

    /// All non-expired keys starting with `prefix`.
    ///
    /// Used for namespaced bulk eviction (e.g. dropping everything under
    /// `auth.` on logout). Entries that cannot be decoded are skipped.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = now_millis();
        let mut matching = Vec::new();

        for key in self.backend.keys().await? {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(raw) = self.backend.get(&key).await? {
                match serde_json::from_str::<StoredEntry>(&raw) {
                    Ok(entry) if !entry.is_expired_at(now) => matching.push(key),
                    _ => {}
                }
            }
        }

        Ok(matching)
    }

    /// Scan all keys and evict every entry whose TTL has passed, plus
    /// any entry that no longer decodes. Returns the eviction count.
    ///
    /// Intended to run from [`crate::cleanup::Janitor`] on app start and
    /// on a coarse timer, never per read.
    pub async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let now = now_millis();
        let mut evicted = 0usize;

        for key in self.backend.keys().await? {
            let Some(raw) = self.backend.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<StoredEntry>(&raw) {
                Ok(entry) => {
                    if entry.is_expired_at(now) {
                        self.remove(&key).await?;
                        evicted += 1;
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Evicting undecodable entry during sweep");
                    crate::metrics::record_corruption(&key);
                    self.remove(&key).await?;
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            info!(evicted, "Expired-entry sweep completed");
        }
        crate::metrics::record_expired_evictions(evicted);
        Ok(evicted)
    }

    /// Current read-cache entry count (for diagnostics).
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Best-effort removal from cache and backend, used on the expiry
    /// and corruption paths where the read itself still succeeds.
    async fn purge(&self, key: &str) {
        self.cache.remove(key);
        if let Err(e) = self.backend.remove(key).await {
            warn!(key = %key, error = %e, "Failed to purge entry from backend");
        }
    }
}
