use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::BufReader;
use tracing::debug;
use uuid::Uuid;

use super::error::StorageError;
use super::hash::ContentHash;
use super::traits::{BlobStore, BoxReader};

const TMP_DIR: &str = ".tmp";

/// Blob store on a local directory, sharded as `{root}/{2 hex}/{62 hex}`.
///
/// Writes land in `{root}/.tmp` first and are renamed into place, so a blob
/// path either holds complete content or does not exist.
pub struct FilesystemBlobStore {
    root: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    pub async fn new(root: impl Into<PathBuf>, max_size: u64) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(root.join(TMP_DIR)).await?;
        Ok(Self { root, max_size })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        let (dir, file) = hash.shard();
        self.root.join(dir).join(file)
    }

    async fn commit(&self, data: &[u8], dest: &Path) -> Result<(), StorageError> {
        let staging = self.root.join(TMP_DIR).join(Uuid::new_v4().to_string());
        let result = async {
            fs::write(&staging, data).await?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::rename(&staging, dest).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&staging).await;
        }
        Ok(result?)
    }
}

fn not_found_as(hash: &ContentHash) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(hash.to_hex())
        } else {
            StorageError::Io(e)
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, data: &[u8]) -> Result<ContentHash, StorageError> {
        let actual = data.len() as u64;
        if actual > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual,
                limit: self.max_size,
            });
        }

        let hash = ContentHash::compute(data);
        let dest = self.blob_path(&hash);
        if fs::try_exists(&dest).await? {
            debug!(%hash, "Blob already present");
            return Ok(hash);
        }

        self.commit(data, &dest).await?;
        debug!(%hash, bytes = actual, "Blob stored");
        Ok(hash)
    }

    async fn get_stream(&self, hash: &ContentHash) -> Result<BoxReader, StorageError> {
        let file = fs::File::open(self.blob_path(hash))
            .await
            .map_err(not_found_as(hash))?;
        Ok(Box::new(BufReader::new(file)))
    }

    async fn size(&self, hash: &ContentHash) -> Result<u64, StorageError> {
        let meta = fs::metadata(self.blob_path(hash))
            .await
            .map_err(not_found_as(hash))?;
        Ok(meta.len())
    }

    async fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.blob_path(hash)).await?)
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        match fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
