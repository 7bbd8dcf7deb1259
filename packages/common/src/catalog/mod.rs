//! Metadata records for stored images, keyed by id and by unique filename.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::ContentHash;
use crate::variant::{ImageContentType, Variant};

mod memory;
#[cfg(feature = "sea-orm")]
mod sea;

pub use memory::MemoryCatalog;
#[cfg(feature = "sea-orm")]
pub use sea::SeaOrmCatalog;

/// One stored file: either an uploaded original or a derived rendition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    /// `{id}` for originals, `{source_id}--{variant}.jpg` for renditions.
    pub filename: String,
    pub content_type: ImageContentType,
    pub owner_id: String,
    /// `None` for originals.
    pub variant: Option<Variant>,
    /// `None` for originals; the original's id for renditions.
    pub source_id: Option<Uuid>,
    pub content_hash: ContentHash,
    /// Unset on an original until a worker has processed it.
    pub size_bytes: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn is_original(&self) -> bool {
        self.source_id.is_none()
    }
}

/// Fields supplied when writing a record; timestamps are set by the catalog.
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    pub id: Uuid,
    pub filename: String,
    pub content_type: ImageContentType,
    pub owner_id: String,
    pub variant: Option<Variant>,
    pub source_id: Option<Uuid>,
    pub content_hash: ContentHash,
    pub size_bytes: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl NewImageRecord {
    fn into_record(self, now: DateTime<Utc>) -> ImageRecord {
        ImageRecord {
            id: self.id,
            filename: self.filename,
            content_type: self.content_type,
            owner_id: self.owner_id,
            variant: self.variant,
            source_id: self.source_id,
            content_hash: self.content_hash,
            size_bytes: self.size_bytes,
            width: self.width,
            height: self.height,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Facts about an original learned by decoding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub size_bytes: i64,
    pub width: u32,
    pub height: u32,
}

/// How a stored file is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaKey {
    Id(Uuid),
    Filename(String),
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Filename(name) => write!(f, "filename {name}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("filename already taken: {0}")]
    FilenameTaken(String),
    #[error("corrupt catalog row {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
    #[error("catalog backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Fails with [`CatalogError::FilenameTaken`] if the filename exists.
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord, CatalogError>;

    /// Insert, or overwrite the content of the record with the same
    /// filename. An overwritten record keeps its id and creation time.
    async fn upsert_rendition(&self, record: NewImageRecord) -> Result<ImageRecord, CatalogError>;

    async fn find(&self, key: &MediaKey) -> Result<Option<ImageRecord>, CatalogError>;

    /// Returns `false` when no original with this id exists.
    async fn update_source_metadata(
        &self,
        id: Uuid,
        meta: SourceMetadata,
    ) -> Result<bool, CatalogError>;

    async fn renditions_of(&self, source_id: Uuid) -> Result<Vec<ImageRecord>, CatalogError>;
}
