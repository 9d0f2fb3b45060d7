//! # Civic Sync
//!
//! Offline-first synchronization and local caching for the civic
//! violation reporting client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Host Application                       │
//! │  • Enqueues local mutations as QueuedChanges               │
//! │  • Triggers sync manually or on connectivity restored      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SyncEngine                           │
//! │  • Connectivity gate, FIFO drain, per-item retry           │
//! │  • Merges confirmed records into the violations cache      │
//! │  • idle / syncing / offline / error status machine         │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                        │
//!                  ▼                        ▼
//! ┌──────────────────────────┐  ┌──────────────────────────────┐
//! │      PendingQueue        │  │   RemoteViolationService     │
//! │  • Durable FIFO of       │  │  • create/update/delete      │
//! │    unconfirmed changes   │  │    against the REST backend  │
//! └──────────────────────────┘  └──────────────────────────────┘
//!                  │
//!                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         KvStore                             │
//! │  • TTL envelopes, transform pipeline, checksums            │
//! │  • Bounded in-process read cache (FIFO)                    │
//! │  • StorageBackend: SQLite on device, memory in tests       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use civic_sync::{
//!     KvStore, MemoryBackend, PendingQueue, QueuedChange, SyncConfig, SyncEngine,
//! };
//! use serde_json::json;
//!
//! # use civic_sync::{Connectivity, RemoteViolationService};
//! # async fn example(remote: Arc<dyn RemoteViolationService>, net: Arc<dyn Connectivity>) {
//! let store = Arc::new(KvStore::new(Arc::new(MemoryBackend::new())));
//! let queue = Arc::new(PendingQueue::load(store.clone()).await.unwrap());
//! let engine = SyncEngine::new(SyncConfig::default(), store, queue.clone(), remote, net);
//!
//! // Report a violation while offline
//! queue
//!     .enqueue(QueuedChange::create(json!({
//!         "category": "parking",
//!         "description": "blocked bike lane",
//!     })))
//!     .await
//!     .unwrap();
//!
//! // Later, once connectivity is back
//! let report = engine.sync_once().await.unwrap();
//! println!("confirmed: {:?}", report.succeeded);
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`store`]: Expiring key-value store over a minimal backend trait
//! - [`queue`]: Durable FIFO of pending local changes
//! - [`engine`]: The sync engine and its status machine
//! - [`cleanup`]: Periodic expired-entry sweeps
//! - [`transform`]: Encode/compress/obfuscate payload pipeline
//! - [`remote`]: Boundary traits for the REST backend and the device
//! - [`violations`]: Typed view over the cached canonical records

pub mod cleanup;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod queue;
pub mod record;
pub mod remote;
pub mod retry;
pub mod store;
pub mod transform;
pub mod violations;

/// Reserved key namespaces within the store.
///
/// Everything this crate persists lives under one of these. Hosts may
/// use any other prefix freely.
pub mod keys {
    /// Bearer token, long TTL
    pub const AUTH_TOKEN: &str = "auth.token";
    /// Prefix of all auth-related entries (bulk-evicted on logout)
    pub const AUTH_PREFIX: &str = "auth.";
    /// Cached canonical violations list, short TTL
    pub const VIOLATIONS_CACHE: &str = "violations.cache";
    /// Pending-change queue, no TTL
    pub const SYNC_QUEUE: &str = "sync.queue";
    /// Timestamp of the last completed sync run, no TTL
    pub const SYNC_LAST_RUN: &str = "sync.lastRun";
}

pub use cleanup::Janitor;
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncError, SyncRun, SyncStatus};
pub use queue::{ChangeOp, PendingQueue, QueuedChange};
pub use record::{Page, ViolationRecord, ViolationStatus};
pub use remote::{
    Connectivity, ListFilters, RemoteError, RemoteViolationService, TokenProvider,
};
pub use store::{
    KvStore, MemoryBackend, SetOptions, SqliteBackend, StorageBackend, StoreError,
};
pub use transform::TransformKind;
pub use violations::ViolationsCache;
