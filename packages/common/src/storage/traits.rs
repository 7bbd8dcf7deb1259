use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;
use super::hash::ContentHash;

pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Content-addressed blob storage. Writes are idempotent: storing the same
/// bytes twice yields the same hash and a single copy.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, data: &[u8]) -> Result<ContentHash, StorageError>;

    async fn get_stream(&self, hash: &ContentHash) -> Result<BoxReader, StorageError>;

    /// Read a whole blob into memory, refusing blobs larger than `limit`.
    async fn get_bounded(&self, hash: &ContentHash, limit: u64) -> Result<Vec<u8>, StorageError> {
        let reader = self.get_stream(hash).await?;
        let mut buf = Vec::new();
        reader.take(limit.saturating_add(1)).read_to_end(&mut buf).await?;
        let actual = buf.len() as u64;
        if actual > limit {
            return Err(StorageError::SizeLimitExceeded { actual, limit });
        }
        Ok(buf)
    }

    async fn size(&self, hash: &ContentHash) -> Result<u64, StorageError>;

    async fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError>;

    /// Returns `false` if there was nothing to delete.
    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError>;
}
