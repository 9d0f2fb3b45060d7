//! Boundary contracts for the remote service and device collaborators.
//!
//! The sync engine never talks HTTP directly; it drives these traits.
//! The embedding host wires them to its HTTP client, its platform
//! connectivity API, and its credential storage. Test suites implement
//! them in-process.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::record::{Page, ViolationRecord};

/// Failure modes of a remote call.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The request never completed (DNS, socket, TLS, ...)
    #[error("network error: {0}")]
    Network(String),
    /// The per-call timeout elapsed
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The server answered with a structured error
    #[error("server rejected request: {status} {message}")]
    Server { status: u16, message: String },
    /// Credentials were rejected; retrying other items is pointless
    #[error("authentication rejected")]
    Unauthorized,
    /// The change targets a record the server has not assigned an id
    /// to yet; the pending create ahead of it must confirm first
    #[error("record has no server-assigned id yet")]
    NotYetCreated,
}

impl RemoteError {
    /// Transient failures are worth retrying within a run; the rest are
    /// not (client errors won't get better, auth failure aborts the run).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Unauthorized | Self::NotYetCreated => false,
        }
    }

    /// True if this failure invalidates the whole run, not just the item.
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Server-side filters for listing violations.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub category: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// The remote violation service, as seen by this subsystem.
///
/// Implementations attach the bearer token from their
/// [`TokenProvider`] to every request; refreshing it on a 401 is their
/// concern, not the engine's.
#[async_trait]
pub trait RemoteViolationService: Send + Sync {
    async fn list(&self, filters: &ListFilters) -> Result<Page<ViolationRecord>, RemoteError>;
    async fn get_one(&self, id: &str) -> Result<ViolationRecord, RemoteError>;
    async fn create(&self, payload: &Value) -> Result<ViolationRecord, RemoteError>;
    async fn update(&self, id: &str, payload: &Value) -> Result<ViolationRecord, RemoteError>;
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;
}

/// Device connectivity, polled at sync-run start.
///
/// Both checks must pass before any network call is attempted; captive
/// portals routinely report a connected link with no actual reachability.
pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> bool;
    fn is_internet_reachable(&self) -> bool;
}

/// Supplies the bearer token attached to remote calls.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}
