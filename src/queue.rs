// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pending-change queue.
//!
//! A durable FIFO of local mutations not yet confirmed by the remote
//! service. The queue is a logical view over the key-value store: the
//! full ordered list is persisted as one serialized array under
//! [`crate::keys::SYNC_QUEUE`] (no TTL), so it survives process
//! restarts and every mutation is a single atomic write.
//!
//! Enqueue and confirmed-dequeue are the only mutators. Both hold the
//! queue mutex across their read-modify-write, so a concurrent reader
//! never observes a partially updated list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::keys;
use crate::store::{now_millis, KvStore, SetOptions, StoreError};

/// The kind of local mutation awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One locally created/edited/deleted record awaiting sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedChange {
    /// Client-generated identifier, stable until the change is confirmed
    pub local_id: String,
    pub operation: ChangeOp,
    /// The record data to send
    pub payload: Value,
    /// Remote identifier, present for update/delete once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Enqueue timestamp (epoch millis), preserves FIFO order
    pub enqueued_at: i64,
    /// Prior sync attempts (telemetry; the engine retries regardless)
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedChange {
    /// A queued creation of a new local record.
    #[must_use]
    pub fn create(payload: Value) -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            operation: ChangeOp::Create,
            payload,
            target_id: None,
            enqueued_at: now_millis(),
            attempts: 0,
        }
    }

    /// A queued edit of a record the server already knows.
    #[must_use]
    pub fn update(target_id: impl Into<String>, payload: Value) -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            operation: ChangeOp::Update,
            payload,
            target_id: Some(target_id.into()),
            enqueued_at: now_millis(),
            attempts: 0,
        }
    }

    /// A queued deletion of a record the server already knows.
    #[must_use]
    pub fn delete(target_id: impl Into<String>) -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            operation: ChangeOp::Delete,
            payload: Value::Null,
            target_id: Some(target_id.into()),
            enqueued_at: now_millis(),
            attempts: 0,
        }
    }
}

/// Durable FIFO of pending changes.
pub struct PendingQueue {
    store: Arc<KvStore>,
    /// Serializes all read-modify-write cycles on the persisted list
    guard: Mutex<()>,
    /// Cached depth so UI badges don't need a storage read
    depth: AtomicUsize,
}

impl PendingQueue {
    /// Load the queue, seeding the cached depth from whatever survived
    /// the last run.
    pub async fn load(store: Arc<KvStore>) -> Result<Self, StoreError> {
        let existing: Vec<QueuedChange> =
            store.get(keys::SYNC_QUEUE).await?.unwrap_or_default();
        if !existing.is_empty() {
            debug!(pending = existing.len(), "Pending changes survived restart");
        }
        let depth = AtomicUsize::new(existing.len());
        crate::metrics::set_queue_depth(existing.len());

        Ok(Self { store, guard: Mutex::new(()), depth })
    }

    /// Append a change to the end of the queue.
    pub async fn enqueue(&self, change: QueuedChange) -> Result<(), StoreError> {
        let _guard = self.guard.lock().await;
        let mut list = self.read_list().await?;
        debug!(
            local_id = %change.local_id,
            operation = %change.operation,
            position = list.len(),
            "Enqueueing pending change"
        );
        list.push(change);
        self.write_list(&list).await
    }

    /// Remove the entry matching `local_id`.
    ///
    /// Only called once the remote write has been confirmed. Returns
    /// whether an entry was actually removed.
    pub async fn dequeue_confirmed(&self, local_id: &str) -> Result<bool, StoreError> {
        let _guard = self.guard.lock().await;
        let mut list = self.read_list().await?;
        let before = list.len();
        list.retain(|c| c.local_id != local_id);

        if list.len() == before {
            warn!(local_id = %local_id, "Confirmed change was not in the queue");
            return Ok(false);
        }

        self.write_list(&list).await?;
        debug!(local_id = %local_id, remaining = list.len(), "Dequeued confirmed change");
        Ok(true)
    }

    /// Bump the attempt counter of the entry matching `local_id` after a
    /// failed sync attempt. The entry itself stays queued.
    pub async fn record_attempt(&self, local_id: &str) -> Result<(), StoreError> {
        let _guard = self.guard.lock().await;
        let mut list = self.read_list().await?;
        if let Some(change) = list.iter_mut().find(|c| c.local_id == local_id) {
            change.attempts = change.attempts.saturating_add(1);
            let attempts = change.attempts;
            self.write_list(&list).await?;
            debug!(local_id = %local_id, attempts, "Recorded failed sync attempt");
        }
        Ok(())
    }

    /// The full ordered list, without mutating it.
    pub async fn peek_all(&self) -> Result<Vec<QueuedChange>, StoreError> {
        self.read_list().await
    }

    /// Number of pending entries (cached; no storage read).
    #[must_use]
    pub fn count(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Whether a sync pass has anything to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    async fn read_list(&self) -> Result<Vec<QueuedChange>, StoreError> {
        Ok(self.store.get(keys::SYNC_QUEUE).await?.unwrap_or_default())
    }

    async fn write_list(&self, list: &[QueuedChange]) -> Result<(), StoreError> {
        self.store
            .set(keys::SYNC_QUEUE, list, &SetOptions::plain())
            .await?;
        self.depth.store(list.len(), Ordering::Release);
        crate::metrics::set_queue_depth(list.len());
        Ok(())
    }
}
