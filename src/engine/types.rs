//! Public types for the sync engine.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

/// Sync engine status.
///
/// Use [`super::SyncEngine::status()`] to check the current status or
/// [`super::SyncEngine::status_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No sync in progress; also the terminal state of a completed run
    Idle,
    /// A run is draining the queue
    Syncing,
    /// The connectivity check failed; nothing was attempted
    Offline,
    /// The run itself could not proceed (e.g. auth failure), distinct
    /// from per-item failures recorded on the run report
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Syncing => write!(f, "syncing"),
            Self::Offline => write!(f, "offline"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Report of the current or most recent sync run.
///
/// Held in memory only; a restart keeps the queue and the last-run
/// timestamp but not this report.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub status: SyncStatus,
    /// Advisory progress, 0 to 100
    pub progress: u8,
    /// When the last *completed* run finished (epoch millis)
    pub last_sync_at: Option<i64>,
    /// Local ids reconciled in this run
    pub succeeded: Vec<String>,
    /// `(local_id, error message)` pairs still unresolved
    pub failed: Vec<(String, String)>,
}

impl Default for SyncRun {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            progress: 0,
            last_sync_at: None,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl SyncRun {
    /// True if every item the run attempted was reconciled.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Errors surfaced by the engine's public API.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A trigger arrived while a run was in flight; it was coalesced
    /// into a no-op
    #[error("a sync run is already in progress")]
    AlreadyRunning,
    #[error("storage error during sync: {0}")]
    Store(#[from] StoreError),
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),
}
