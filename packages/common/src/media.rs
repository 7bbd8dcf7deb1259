//! Blob bytes plus catalog metadata, addressed by id or filename.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::catalog::{CatalogError, ImageCatalog, ImageRecord, MediaKey, NewImageRecord};
use crate::storage::{BlobStore, BoxReader, StorageError};
use crate::variant::{ImageContentType, Variant};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("no media with {0}")]
    NotFound(MediaKey),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl MediaError {
    /// True for a missing record and for a record whose blob is gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Storage(e) => e.is_not_found(),
            Self::Catalog(_) => false,
        }
    }
}

/// Bytes and descriptive fields for a write.
pub struct NewMedia<'a> {
    bytes: &'a [u8],
    content_type: ImageContentType,
    owner_id: String,
    variant: Option<Variant>,
    source_id: Option<Uuid>,
    filename: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl<'a> NewMedia<'a> {
    /// An uploaded original. Size and dimensions are filled in later by the
    /// worker that decodes it.
    pub fn original(
        bytes: &'a [u8],
        content_type: ImageContentType,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            content_type,
            owner_id: owner_id.into(),
            variant: None,
            source_id: None,
            filename: None,
            width: None,
            height: None,
        }
    }

    /// A JPEG rendition of `source`, stored under its ladder filename.
    pub fn rendition(
        source: &ImageRecord,
        variant: Variant,
        bytes: &'a [u8],
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            bytes,
            content_type: ImageContentType::Jpeg,
            owner_id: source.owner_id.clone(),
            variant: Some(variant),
            source_id: Some(source.id),
            filename: Some(variant.filename(source.id)),
            width: Some(width),
            height: Some(height),
        }
    }

    fn into_record(self, id: Uuid, content_hash: crate::storage::ContentHash) -> NewImageRecord {
        let size_bytes = self.source_id.map(|_| self.bytes.len() as i64);
        NewImageRecord {
            id,
            filename: self.filename.unwrap_or_else(|| id.to_string()),
            content_type: self.content_type,
            owner_id: self.owner_id,
            variant: self.variant,
            source_id: self.source_id,
            content_hash,
            size_bytes,
            width: self.width,
            height: self.height,
        }
    }
}

/// An open stored file.
pub struct MediaObject {
    pub record: ImageRecord,
    pub size: u64,
    pub reader: BoxReader,
}

/// Filename-addressable file storage over a [`BlobStore`] and an
/// [`ImageCatalog`]. Bytes are always written before the record that points
/// at them, so a visible record always has readable content.
#[derive(Clone)]
pub struct MediaStore {
    blobs: Arc<dyn BlobStore>,
    catalog: Arc<dyn ImageCatalog>,
}

impl MediaStore {
    pub fn new(blobs: Arc<dyn BlobStore>, catalog: Arc<dyn ImageCatalog>) -> Self {
        Self { blobs, catalog }
    }

    pub fn catalog(&self) -> &dyn ImageCatalog {
        self.catalog.as_ref()
    }

    /// Store a new file under a fresh id.
    #[instrument(skip_all, fields(bytes = media.bytes.len(), variant = ?media.variant))]
    pub async fn put(&self, media: NewMedia<'_>) -> Result<ImageRecord, MediaError> {
        let hash = self.blobs.put(media.bytes).await?;
        let record = self
            .catalog
            .insert(media.into_record(Uuid::now_v7(), hash))
            .await?;
        debug!(id = %record.id, filename = %record.filename, "Media stored");
        Ok(record)
    }

    /// Store a rendition, replacing any previous content under its filename.
    #[instrument(skip_all, fields(source_id = ?media.source_id, variant = ?media.variant))]
    pub async fn put_rendition(&self, media: NewMedia<'_>) -> Result<ImageRecord, MediaError> {
        let hash = self.blobs.put(media.bytes).await?;
        let record = self
            .catalog
            .upsert_rendition(media.into_record(Uuid::now_v7(), hash))
            .await?;
        debug!(id = %record.id, filename = %record.filename, "Rendition stored");
        Ok(record)
    }

    pub async fn stat(&self, key: &MediaKey) -> Result<Option<ImageRecord>, MediaError> {
        Ok(self.catalog.find(key).await?)
    }

    pub async fn open(&self, key: &MediaKey) -> Result<MediaObject, MediaError> {
        let record = self.require(key).await?;
        let size = self.blobs.size(&record.content_hash).await?;
        let reader = self.blobs.get_stream(&record.content_hash).await?;
        Ok(MediaObject {
            record,
            size,
            reader,
        })
    }

    /// Read a whole file, refusing content larger than `limit` bytes.
    pub async fn read_to_end(
        &self,
        key: &MediaKey,
        limit: u64,
    ) -> Result<(ImageRecord, Vec<u8>), MediaError> {
        let record = self.require(key).await?;
        let bytes = self.blobs.get_bounded(&record.content_hash, limit).await?;
        Ok((record, bytes))
    }

    async fn require(&self, key: &MediaKey) -> Result<ImageRecord, MediaError> {
        self.catalog
            .find(key)
            .await?
            .ok_or_else(|| MediaError::NotFound(key.clone()))
    }
}
