//! Periodic cache cleanup.
//!
//! The [`Janitor`] reclaims space and prevents stale reads by sweeping
//! expired entries out of the store. It runs opportunistically on app
//! start/foreground and on a coarse timer, never per read; a read cache
//! that gets swept on every access is not a cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::{KvStore, StoreError};

pub struct Janitor {
    store: Arc<KvStore>,
    interval: Duration,
}

impl Janitor {
    #[must_use]
    pub fn new(store: Arc<KvStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// One sweep. Safe to call at any time (e.g. on app foreground);
    /// calling it twice back to back evicts nothing the second time.
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        self.store.cleanup_expired().await
    }

    /// Spawn the background sweep loop: one immediate pass, then one per
    /// interval until the handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(evicted) => {
                        debug!(evicted, "Periodic cleanup pass finished");
                    }
                    Err(e) => {
                        // Transient storage trouble; the next tick retries
                        warn!(error = %e, "Periodic cleanup pass failed");
                    }
                }
            }
        })
    }
}
