use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Minimal durable persistence contract the key-value store is built on.
///
/// Implementations must make each call atomic: a reader never observes a
/// partially written value. The bundled implementations are
/// [`MemoryBackend`](super::MemoryBackend) and
/// [`SqliteBackend`](super::SqliteBackend); embedding hosts can provide
/// their own (e.g. over a platform storage API).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently present, in no particular order.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
