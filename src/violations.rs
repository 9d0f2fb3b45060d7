//! Cached canonical violation records.
//!
//! A typed view over the `violations.cache` namespace: the last list of
//! violations fetched from the server, stored compressed with a short
//! TTL. The sync engine merges confirmed changes into this cache so the
//! UI reflects server-assigned ids without an extra fetch.
//!
//! Merges only touch an *existing* cached list. If the cache is absent
//! or expired, there is nothing trustworthy to merge into; the next
//! listing fetch repopulates it wholesale.

use std::sync::Arc;

use tracing::debug;

use crate::keys;
use crate::record::ViolationRecord;
use crate::store::{KvStore, SetOptions, StoreError};
use crate::transform::TransformKind;

pub struct ViolationsCache {
    store: Arc<KvStore>,
    ttl_ms: u64,
}

impl ViolationsCache {
    #[must_use]
    pub fn new(store: Arc<KvStore>, ttl_ms: u64) -> Self {
        Self { store, ttl_ms }
    }

    fn set_options(&self) -> SetOptions {
        SetOptions::ttl(self.ttl_ms).with_transform(TransformKind::Compress)
    }

    /// The cached list, or `None` if absent/expired.
    pub async fn list(&self) -> Result<Option<Vec<ViolationRecord>>, StoreError> {
        self.store.get(keys::VIOLATIONS_CACHE).await
    }

    /// Replace the cached list wholesale (after a fresh server fetch).
    pub async fn replace_list(&self, records: &[ViolationRecord]) -> Result<(), StoreError> {
        debug!(count = records.len(), "Replacing cached violations list");
        self.store
            .set(keys::VIOLATIONS_CACHE, records, &self.set_options())
            .await
    }

    /// Swap the local-only record matching `local_id` for its confirmed
    /// server copy. Appends instead if no local copy is cached.
    pub async fn confirm_create(
        &self,
        local_id: &str,
        confirmed: ViolationRecord,
    ) -> Result<(), StoreError> {
        let Some(mut records) = self.list().await? else {
            debug!(local_id = %local_id, "No cached list to merge confirmed create into");
            return Ok(());
        };

        match records
            .iter_mut()
            .find(|r| r.local_id.as_deref() == Some(local_id))
        {
            Some(slot) => *slot = confirmed,
            None => records.push(confirmed),
        }
        self.write_back(records).await
    }

    /// Replace the cached copy of a server-known record.
    pub async fn upsert(&self, record: ViolationRecord) -> Result<(), StoreError> {
        let Some(mut records) = self.list().await? else {
            return Ok(());
        };

        match records
            .iter_mut()
            .find(|r| r.id.is_some() && r.id == record.id)
        {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
        self.write_back(records).await
    }

    /// Drop a record by server id after a confirmed remote delete.
    pub async fn remove_by_id(&self, id: &str) -> Result<(), StoreError> {
        let Some(mut records) = self.list().await? else {
            return Ok(());
        };

        records.retain(|r| r.id.as_deref() != Some(id));
        self.write_back(records).await
    }

    /// Drop the whole cached list.
    pub async fn invalidate(&self) -> Result<(), StoreError> {
        self.store.remove(keys::VIOLATIONS_CACHE).await
    }

    async fn write_back(&self, records: Vec<ViolationRecord>) -> Result<(), StoreError> {
        self.store
            .set(keys::VIOLATIONS_CACHE, &records, &self.set_options())
            .await
    }
}
