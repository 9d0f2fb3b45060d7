// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronization engine.
//!
//! The [`SyncEngine`] reconciles the pending-change queue against the
//! remote violation service, one entry at a time, in FIFO order.
//!
//! # Status machine
//!
//! ```text
//!            trigger                   queue drained
//!   Idle ───────────────► Syncing ───────────────────► Idle
//!    │                       │
//!    │ connectivity check    │ run-level failure
//!    ▼ failed                ▼ (auth rejected)
//!  Offline                 Error
//! ```
//!
//! A completed run always lands back on `Idle`, even with per-item
//! failures; those stay on the run report and their entries stay
//! queued. `Offline` and `Error` are terminal for the trigger only; the
//! next trigger starts over.
//!
//! # Concurrency
//!
//! At most one run is in flight. A trigger received while `Syncing`
//! fails fast with [`SyncError::AlreadyRunning`] instead of starting a
//! second drain of the same queue. Cancellation is honored at item
//! boundaries only; an in-flight request runs to completion or timeout.

mod run;
mod types;

pub use types::{SyncError, SyncRun, SyncStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};

use crate::config::SyncConfig;
use crate::keys;
use crate::queue::PendingQueue;
use crate::remote::{Connectivity, RemoteViolationService};
use crate::store::{KvStore, StoreError};
use crate::violations::ViolationsCache;

/// Drives reconciliation of local changes with the remote service.
///
/// Owns no persisted state of its own: everything durable lives in the
/// store (via the queue and the violations cache); the engine holds only
/// the transient run report.
pub struct SyncEngine {
    pub(super) config: SyncConfig,
    pub(super) store: Arc<KvStore>,
    pub(super) queue: Arc<PendingQueue>,
    pub(super) violations: ViolationsCache,
    pub(super) remote: Arc<dyn RemoteViolationService>,
    pub(super) connectivity: Arc<dyn Connectivity>,

    /// Held for the duration of a run; `try_lock` coalesces triggers
    pub(super) run_guard: Mutex<()>,
    status_tx: watch::Sender<SyncStatus>,
    status_rx: watch::Receiver<SyncStatus>,
    pub(super) cancel_requested: AtomicBool,
    pub(super) current: RwLock<SyncRun>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        store: Arc<KvStore>,
        queue: Arc<PendingQueue>,
        remote: Arc<dyn RemoteViolationService>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(SyncStatus::Idle);
        let violations = ViolationsCache::new(store.clone(), config.list_cache_ttl_ms);

        Self {
            config,
            store,
            queue,
            violations,
            remote,
            connectivity,
            run_guard: Mutex::new(()),
            status_tx,
            status_rx,
            cancel_requested: AtomicBool::new(false),
            current: RwLock::new(SyncRun::default()),
        }
    }

    /// Current engine status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        *self.status_rx.borrow()
    }

    /// Get a receiver to watch status changes (for UI badges).
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    /// Snapshot of the current/most recent run report.
    #[must_use]
    pub fn run_report(&self) -> SyncRun {
        self.current.read().clone()
    }

    /// Number of changes still waiting for confirmation.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.count()
    }

    /// The typed view over the cached canonical records.
    #[must_use]
    pub fn violations(&self) -> &ViolationsCache {
        &self.violations
    }

    /// Ask a running sync to stop before its next item. The item whose
    /// request is already in flight still runs to completion.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    /// When the last completed run finished, surviving restarts
    /// (epoch millis).
    pub async fn last_sync_at(&self) -> Result<Option<i64>, StoreError> {
        self.store.get(keys::SYNC_LAST_RUN).await
    }

    pub(super) fn set_status(&self, status: SyncStatus) {
        self.current.write().status = status;
        let _ = self.status_tx.send(status);
    }
}
