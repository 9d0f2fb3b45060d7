// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The sync run: connectivity gate, queue drain, canonical-record merge.

use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::keys;
use crate::queue::{ChangeOp, QueuedChange};
use crate::record::ViolationRecord;
use crate::remote::{ListFilters, RemoteError};
use crate::retry::{retry_if, RetryConfig};
use crate::store::{now_millis, SetOptions};

use super::{SyncEngine, SyncError, SyncRun, SyncStatus};

/// Server acknowledgement of a dispatched change.
pub(super) enum Confirmation {
    Created(ViolationRecord),
    Updated(ViolationRecord),
    Deleted(String),
}

/// How a drain loop ended.
enum DrainEnd {
    /// Every snapshotted item was attempted
    Completed,
    /// Cancellation honored at an item boundary
    Cancelled,
    /// Run-level failure; remaining items left queued
    AuthFailed,
}

impl SyncEngine {
    /// Run one sync pass.
    ///
    /// Checks connectivity, snapshots the queue and drains it in FIFO
    /// order. A per-item failure never blocks the items behind it; a
    /// run-level failure (connectivity, auth) leaves everything not yet
    /// confirmed in the queue for the next trigger.
    ///
    /// Returns [`SyncError::AlreadyRunning`] if a pass is in flight;
    /// the trigger is coalesced, nothing is read twice.
    #[tracing::instrument(skip(self), fields(pending = self.queue.count()))]
    pub async fn sync_once(&self) -> Result<SyncRun, SyncError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;

        if !(self.connectivity.is_connected() && self.connectivity.is_internet_reachable()) {
            info!("Connectivity check failed, sync run skipped");
            self.set_status(SyncStatus::Offline);
            crate::metrics::record_sync_run("offline");
            return Ok(self.run_report());
        }

        self.cancel_requested.store(false, Ordering::Release);
        {
            let mut run = self.current.write();
            run.succeeded.clear();
            run.failed.clear();
            run.progress = 0;
        }
        self.set_status(SyncStatus::Syncing);
        let started = Instant::now();

        let pending = match self.queue.peek_all().await {
            Ok(pending) => pending,
            Err(e) => {
                self.set_status(SyncStatus::Error);
                crate::metrics::record_sync_run("error");
                return Err(e.into());
            }
        };
        info!(pending = pending.len(), "Sync run started");

        let end = match self.drain(&pending).await {
            Ok(end) => end,
            Err(e) => {
                self.set_status(SyncStatus::Error);
                crate::metrics::record_sync_run("error");
                return Err(e);
            }
        };

        let terminal = match end {
            DrainEnd::Completed => {
                self.advance_progress(pending.len(), pending.len());
                let finished_at = now_millis();
                if let Err(e) = self
                    .store
                    .set(keys::SYNC_LAST_RUN, &finished_at, &SetOptions::plain())
                    .await
                {
                    self.set_status(SyncStatus::Error);
                    crate::metrics::record_sync_run("error");
                    return Err(e.into());
                }
                self.current.write().last_sync_at = Some(finished_at);
                SyncStatus::Idle
            }
            // A cancelled run is not an error, but it didn't complete,
            // so the last-run timestamp is left alone
            DrainEnd::Cancelled => SyncStatus::Idle,
            DrainEnd::AuthFailed => SyncStatus::Error,
        };

        self.set_status(terminal);
        crate::metrics::record_sync_run(match terminal {
            SyncStatus::Idle => "idle",
            SyncStatus::Error => "error",
            SyncStatus::Offline => "offline",
            SyncStatus::Syncing => "syncing",
        });
        crate::metrics::record_sync_run_duration(started.elapsed());

        let report = self.run_report();
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            status = %terminal,
            "Sync run finished"
        );
        Ok(report)
    }

    /// Fetch the current listing from the server and replace the cached
    /// canonical records with it.
    #[tracing::instrument(skip(self, filters))]
    pub async fn refresh_violations(
        &self,
        filters: &ListFilters,
    ) -> Result<Vec<ViolationRecord>, SyncError> {
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let page = retry_if(
            "remote_list",
            &self.remote_retry_config(),
            RemoteError::is_transient,
            || with_timeout(timeout, self.remote.list(filters)),
        )
        .await?;

        self.violations.replace_list(&page.items).await?;
        debug!(count = page.items.len(), total = page.total, "Violations list refreshed");
        Ok(page.items)
    }

    async fn drain(&self, pending: &[QueuedChange]) -> Result<DrainEnd, SyncError> {
        let total = pending.len();

        for (index, change) in pending.iter().enumerate() {
            // Cancellation is only honored here, never mid-request
            if self.cancel_requested.load(Ordering::Acquire) {
                info!(
                    processed = index,
                    remaining = total - index,
                    "Sync run cancelled at item boundary"
                );
                return Ok(DrainEnd::Cancelled);
            }

            let op = change.operation.to_string();
            let call_started = Instant::now();

            match self.dispatch(change).await {
                Ok(confirmation) => {
                    crate::metrics::record_remote_latency(&op, call_started.elapsed());
                    self.queue.dequeue_confirmed(&change.local_id).await?;
                    self.apply_confirmed(change, confirmation).await;
                    crate::metrics::record_sync_item(&op, "success");
                    self.current.write().succeeded.push(change.local_id.clone());
                    self.advance_progress(index + 1, total);
                    debug!(local_id = %change.local_id, operation = %op, "Change confirmed");
                }
                Err(e) => {
                    crate::metrics::record_remote_latency(&op, call_started.elapsed());
                    self.queue.record_attempt(&change.local_id).await?;
                    crate::metrics::record_sync_item(&op, "failure");
                    self.current
                        .write()
                        .failed
                        .push((change.local_id.clone(), e.to_string()));
                    self.advance_progress(index + 1, total);

                    if e.is_run_fatal() {
                        error!(
                            local_id = %change.local_id,
                            error = %e,
                            "Run-level failure, aborting remaining items"
                        );
                        return Ok(DrainEnd::AuthFailed);
                    }
                    warn!(
                        local_id = %change.local_id,
                        operation = %op,
                        attempts = change.attempts + 1,
                        error = %e,
                        "Change failed, left queued for retry"
                    );
                }
            }
        }

        Ok(DrainEnd::Completed)
    }

    /// Dispatch one change to the remote service, with per-call timeout
    /// and bounded retry on transient failures.
    async fn dispatch(&self, change: &QueuedChange) -> Result<Confirmation, RemoteError> {
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let retry_config = self.remote_retry_config();

        match change.operation {
            ChangeOp::Create => {
                let record = retry_if(
                    "remote_create",
                    &retry_config,
                    RemoteError::is_transient,
                    || with_timeout(timeout, self.remote.create(&change.payload)),
                )
                .await?;
                Ok(Confirmation::Created(record))
            }
            ChangeOp::Update => {
                let Some(id) = change.target_id.as_deref() else {
                    return Err(RemoteError::NotYetCreated);
                };
                let record = retry_if(
                    "remote_update",
                    &retry_config,
                    RemoteError::is_transient,
                    || with_timeout(timeout, self.remote.update(id, &change.payload)),
                )
                .await?;
                Ok(Confirmation::Updated(record))
            }
            ChangeOp::Delete => {
                let Some(id) = change.target_id.as_deref() else {
                    return Err(RemoteError::NotYetCreated);
                };
                retry_if(
                    "remote_delete",
                    &retry_config,
                    RemoteError::is_transient,
                    || with_timeout(timeout, self.remote.delete(id)),
                )
                .await?;
                Ok(Confirmation::Deleted(id.to_string()))
            }
        }
    }

    /// Merge a confirmed change into the cached canonical records.
    ///
    /// The remote write already succeeded and the queue entry is gone;
    /// a merge failure only degrades the cache, so it is logged and
    /// swallowed rather than failing the run.
    async fn apply_confirmed(&self, change: &QueuedChange, confirmation: Confirmation) {
        let merged = match confirmation {
            Confirmation::Created(mut record) => {
                if record.local_id.is_none() {
                    record.local_id = Some(change.local_id.clone());
                }
                self.violations.confirm_create(&change.local_id, record).await
            }
            Confirmation::Updated(record) => self.violations.upsert(record).await,
            Confirmation::Deleted(id) => self.violations.remove_by_id(&id).await,
        };

        if let Err(e) = merged {
            warn!(
                local_id = %change.local_id,
                error = %e,
                "Confirmed change could not be merged into the cache"
            );
        }
    }

    fn remote_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.config.remote_retry_attempts.max(1),
            initial_delay: Duration::from_millis(self.config.remote_retry_initial_ms),
            max_delay: Duration::from_millis(self.config.remote_retry_max_ms),
            factor: 2.0,
        }
    }

    fn advance_progress(&self, processed: usize, total: usize) {
        let progress = if total == 0 {
            100
        } else {
            ((processed * 100) / total).min(100) as u8
        };
        self.current.write().progress = progress;
    }
}

async fn with_timeout<T>(
    duration: Duration,
    fut: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(duration)),
    }
}
