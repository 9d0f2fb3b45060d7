//! Payload transforms for stored entries.
//!
//! A transform pipeline is an ordered list of [`TransformKind`] steps
//! applied to the serialized payload on write and reversed (right to
//! left) on read. The steps actually applied are recorded on the stored
//! envelope, so a read never has to guess what a writer did.
//!
//! Transforms are advisory: a failing step degrades to the untransformed
//! payload (logged, never fatal). The cache keeps working even if a
//! payload turns out not to be compressible or decodable.
//!
//! # Obfuscation is not encryption
//!
//! [`TransformKind::Obfuscate`] is a reversible masking encoding carried
//! over from the original client. It provides **no confidentiality
//! guarantee** whatsoever; anyone with this source can reverse it.
//! Deployments that need data at rest protected must put real
//! cryptography at the persistence backend instead.
//!
//! # Example
//!
//! ```
//! use civic_sync::transform::{apply_pipeline, reverse_pipeline, TransformKind};
//!
//! let (stored, applied) = apply_pipeline(
//!     &[TransformKind::Compress, TransformKind::Encode],
//!     r#"{"category":"parking"}"#.to_string(),
//! );
//! let restored = reverse_pipeline(&applied, stored);
//! assert_eq!(restored, r#"{"category":"parking"}"#);
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Zstd magic bytes (little-endian): 0xFD2FB528
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default compression level (3 is a good balance of speed/ratio)
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Rolling mask for the obfuscate step. Deliberately a compile-time
/// constant: this step is an encoding, not a cipher.
const OBFUSCATE_MASK: &[u8] = b"civic-sync-mask";

/// A single named step of the transform pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Base64 over the UTF-8 payload
    Encode,
    /// Zstd compression, base64-wrapped for string storage
    Compress,
    /// Reversible byte mask. NOT cryptographically secure.
    Obfuscate,
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode => write!(f, "encode"),
            Self::Compress => write!(f, "compress"),
            Self::Obfuscate => write!(f, "obfuscate"),
        }
    }
}

/// Transform error types
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("encoding failed: {0}")]
    EncodeFailed(String),
    #[error("decoding failed: {0}")]
    DecodeFailed(String),
    #[error("compression failed: {0}")]
    CompressFailed(String),
    #[error("decompression failed: {0}")]
    DecompressFailed(String),
}

/// Check if data is zstd-compressed by checking magic bytes.
#[inline]
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZSTD_MAGIC
}

fn mask_bytes(data: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(OBFUSCATE_MASK.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

/// Apply a single transform step.
pub fn apply_step(kind: TransformKind, payload: &str) -> Result<String, TransformError> {
    match kind {
        TransformKind::Encode => Ok(BASE64.encode(payload.as_bytes())),
        TransformKind::Compress => {
            let compressed = zstd::encode_all(payload.as_bytes(), DEFAULT_COMPRESSION_LEVEL)
                .map_err(|e| TransformError::CompressFailed(e.to_string()))?;
            Ok(BASE64.encode(compressed))
        }
        TransformKind::Obfuscate => Ok(BASE64.encode(mask_bytes(payload.as_bytes()))),
    }
}

/// Reverse a single transform step.
pub fn reverse_step(kind: TransformKind, payload: &str) -> Result<String, TransformError> {
    match kind {
        TransformKind::Encode => {
            let bytes = BASE64
                .decode(payload)
                .map_err(|e| TransformError::DecodeFailed(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| TransformError::DecodeFailed(e.to_string()))
        }
        TransformKind::Compress => {
            let bytes = BASE64
                .decode(payload)
                .map_err(|e| TransformError::DecodeFailed(e.to_string()))?;
            let raw = if is_compressed(&bytes) {
                zstd::decode_all(bytes.as_slice())
                    .map_err(|e| TransformError::DecompressFailed(e.to_string()))?
            } else {
                // Uncompressed data from a writer whose compress step degraded
                bytes
            };
            String::from_utf8(raw).map_err(|e| TransformError::DecompressFailed(e.to_string()))
        }
        TransformKind::Obfuscate => {
            let bytes = BASE64
                .decode(payload)
                .map_err(|e| TransformError::DecodeFailed(e.to_string()))?;
            String::from_utf8(mask_bytes(&bytes))
                .map_err(|e| TransformError::DecodeFailed(e.to_string()))
        }
    }
}

/// Apply a pipeline of transforms in order.
///
/// Returns the transformed payload together with the list of steps that
/// actually succeeded. A failing step is skipped and logged; the payload
/// continues through the remaining steps untransformed by it.
pub fn apply_pipeline(kinds: &[TransformKind], payload: String) -> (String, Vec<TransformKind>) {
    let mut current = payload;
    let mut applied = Vec::with_capacity(kinds.len());

    for &kind in kinds {
        match apply_step(kind, &current) {
            Ok(next) => {
                current = next;
                applied.push(kind);
            }
            Err(e) => {
                warn!(step = %kind, error = %e, "Transform step failed, storing without it");
            }
        }
    }

    (current, applied)
}

/// Reverse an applied pipeline, right to left.
///
/// A failing reverse step stops the unwinding and returns the payload as
/// it stands; the caller's deserialization decides whether the result is
/// usable.
pub fn reverse_pipeline(applied: &[TransformKind], payload: String) -> String {
    let mut current = payload;

    for &kind in applied.iter().rev() {
        match reverse_step(kind, &current) {
            Ok(next) => current = next,
            Err(e) => {
                warn!(step = %kind, error = %e, "Reverse transform failed, returning raw payload");
                return current;
            }
        }
    }

    current
}
