//! Stored entry envelope.
//!
//! Every value persisted through the store is wrapped in a [`StoredEntry`]
//! carrying its write time, optional expiry, the transform steps applied
//! to the payload, and a checksum for corruption detection.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::transform::TransformKind;

/// Current time as epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// The persisted wrapper around a serialized value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Key this entry is stored under
    pub key: String,
    /// Serialized value, after the transform pipeline
    pub payload: String,
    /// Write timestamp (epoch millis)
    pub created_at: i64,
    /// Expiry timestamp (epoch millis); `None` means never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Transform steps applied to `payload`, in application order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied: Vec<TransformKind>,
    /// Hex SHA-256 of `payload`
    pub checksum: String,
}

impl StoredEntry {
    /// Wrap a transformed payload, stamping `created_at` and the checksum.
    pub fn new(
        key: String,
        payload: String,
        expiry_ms: Option<u64>,
        applied: Vec<TransformKind>,
    ) -> Self {
        let created_at = now_millis();
        let checksum = checksum_of(&payload);
        Self {
            key,
            expires_at: expiry_ms.map(|ms| created_at + ms as i64),
            payload,
            created_at,
            applied,
            checksum,
        }
    }

    /// True if the entry's TTL has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Expiry check against an explicit clock value.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// True if `payload` still matches the stored checksum.
    #[must_use]
    pub fn checksum_ok(&self) -> bool {
        checksum_of(&self.payload) == self.checksum
    }
}

/// Hex SHA-256 of a payload string.
pub(crate) fn checksum_of(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}
