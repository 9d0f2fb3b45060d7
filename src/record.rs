//! Violation record data structures.
//!
//! The [`ViolationRecord`] is the canonical record that flows through the
//! cache and sync engine. Records created offline carry only a
//! client-generated `local_id`; the server-assigned `id` is filled in when
//! the corresponding queued change is confirmed.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a reported violation, as tracked by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    /// Created locally, not yet submitted
    Draft,
    /// Accepted by the server, awaiting triage
    Submitted,
    /// Under review by the municipality
    InReview,
    /// Closed as resolved
    Resolved,
    /// Closed as rejected
    Rejected,
}

impl std::fmt::Display for ViolationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Submitted => write!(f, "submitted"),
            Self::InReview => write!(f, "in_review"),
            Self::Resolved => write!(f, "resolved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A reported civic violation (parking, noise, vandalism, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Server-assigned identifier; `None` until the record is confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Client-generated identifier, stable across sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// Violation category (e.g. "parking", "noise", "vandalism")
    pub category: String,
    /// Free-form description entered by the reporter
    pub description: String,
    /// Location of the violation
    pub latitude: f64,
    pub longitude: f64,
    /// Uploaded photo references (URLs or upload handles)
    #[serde(default)]
    pub photos: Vec<String>,
    /// Server-side lifecycle status
    pub status: ViolationStatus,
    /// When the violation was reported (epoch millis)
    pub reported_at: i64,
}

impl ViolationRecord {
    /// True if this record exists only on this device.
    #[must_use]
    pub fn is_local_only(&self) -> bool {
        self.id.is_none()
    }
}

/// One page of a paginated listing from the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}
