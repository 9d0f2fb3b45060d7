//! Bounded in-process read cache.
//!
//! Sits in front of the durable backend so repeated reads of hot keys
//! (the violations list, auth tokens) skip deserialization of the
//! envelope and the backend round trip entirely.
//!
//! Eviction is insertion-order FIFO: when the cache is full, the oldest
//! *inserted* key is dropped, regardless of how recently it was read.
//! This is a capacity bound, not an LRU; it mirrors the original client
//! and keeps bookkeeping trivial. An LRU would be a drop-in upgrade here
//! since nothing observable depends on which key gets evicted.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;

/// A cached value: the plain (reverse-transformed) JSON payload plus the
/// expiry carried over from the envelope so hits can still expire.
#[derive(Debug, Clone)]
pub(crate) struct CachedValue {
    pub json: String,
    pub expires_at: Option<i64>,
}

pub(crate) struct ReadCache {
    capacity: usize,
    entries: DashMap<String, CachedValue>,
    /// Insertion order; may contain ghosts of removed keys, skipped at
    /// eviction time.
    order: Mutex<VecDeque<String>>,
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedValue> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub fn insert(&self, key: &str, value: CachedValue) {
        if self.entries.insert(key.to_string(), value).is_some() {
            // Overwrite keeps the original insertion slot
            return;
        }

        let mut order = self.order.lock();
        order.push_back(key.to_string());

        while self.entries.len() > self.capacity {
            match order.pop_front() {
                Some(oldest) => {
                    if self.entries.remove(&oldest).is_some() {
                        crate::metrics::record_cache_eviction();
                    }
                }
                None => break,
            }
        }
        crate::metrics::set_read_cache_entries(self.entries.len());
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
        crate::metrics::set_read_cache_entries(self.entries.len());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
