use std::sync::Arc;

use common::catalog::SourceMetadata;
use common::storage::StorageError;
use common::{ImageRecord, MediaError, MediaKey, MediaStore, NewMedia, Variant};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::DeriveError;
use crate::imaging::{self, Dimensions};
use crate::ladder;

#[derive(Debug, Clone, Copy)]
pub struct DeriveSettings {
    pub jpeg_quality: u8,
    pub max_source_bytes: u64,
}

impl From<&WorkerConfig> for DeriveSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            max_source_bytes: config.max_source_bytes,
        }
    }
}

impl Default for DeriveSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenRendition {
    pub variant: Variant,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

/// Outcome of one successful derivation run.
#[derive(Debug, Clone, Serialize)]
pub struct DerivationReport {
    pub image_id: Uuid,
    pub source: Dimensions,
    pub source_bytes: usize,
    pub renditions: Vec<WrittenRendition>,
    /// The original's size/dimension update is best-effort.
    pub metadata_updated: bool,
}

/// Produces the rendition ladder for one original.
///
/// Runs are idempotent: renditions are upserted under deterministic
/// filenames, so a redelivered job converges on the same set of records.
pub struct Deriver {
    media: MediaStore,
    settings: DeriveSettings,
}

impl Deriver {
    pub fn new(media: MediaStore, settings: DeriveSettings) -> Self {
        Self { media, settings }
    }

    #[instrument(skip(self))]
    pub async fn derive(&self, id: Uuid) -> Result<DerivationReport, DeriveError> {
        let (source, bytes) = self.fetch(id).await?;
        let source_bytes = bytes.len();

        let dimensions =
            imaging::probe(&bytes).map_err(|source| DeriveError::Undecodable { id, source })?;
        let raster = tokio::task::spawn_blocking(move || imaging::decode(&bytes))
            .await?
            .map_err(|source| DeriveError::Undecodable { id, source })?;
        let raster = Arc::new(raster);

        let mut renditions = Vec::new();
        for planned in ladder::plan(dimensions) {
            let variant = planned.variant;
            let encoded = {
                let raster = Arc::clone(&raster);
                let quality = self.settings.jpeg_quality;
                tokio::task::spawn_blocking(move || {
                    imaging::render_jpeg(&raster, variant.bound(), quality)
                })
                .await?
                .map_err(|source| DeriveError::Encode { variant, source })?
            };

            let Dimensions { width, height } = encoded.dimensions;
            let record = self
                .media
                .put_rendition(NewMedia::rendition(
                    &source,
                    variant,
                    &encoded.bytes,
                    width,
                    height,
                ))
                .await?;
            debug!(
                filename = %record.filename,
                width,
                height,
                bytes = encoded.bytes.len(),
                "Rendition written"
            );
            renditions.push(WrittenRendition {
                variant,
                filename: record.filename,
                width,
                height,
                bytes: encoded.bytes.len(),
            });
        }
        drop(raster);

        let metadata_updated = self.update_metadata(id, source_bytes, dimensions).await;

        Ok(DerivationReport {
            image_id: id,
            source: dimensions,
            source_bytes,
            renditions,
            metadata_updated,
        })
    }

    async fn fetch(&self, id: Uuid) -> Result<(ImageRecord, Vec<u8>), DeriveError> {
        let limit = self.settings.max_source_bytes;
        match self.media.read_to_end(&MediaKey::Id(id), limit).await {
            Ok((record, _)) if !record.is_original() => Err(DeriveError::OriginalNotFound(id)),
            Ok(found) => Ok(found),
            Err(e) if e.is_not_found() => Err(DeriveError::OriginalNotFound(id)),
            Err(MediaError::Storage(StorageError::SizeLimitExceeded { .. })) => {
                Err(DeriveError::SourceTooLarge { id, limit })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_metadata(&self, id: Uuid, source_bytes: usize, dims: Dimensions) -> bool {
        let meta = SourceMetadata {
            size_bytes: i64::try_from(source_bytes).unwrap_or(i64::MAX),
            width: dims.width,
            height: dims.height,
        };
        match self.media.catalog().update_source_metadata(id, meta).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(image_id = %id, "Original vanished before metadata update");
                false
            }
            Err(e) => {
                warn!(image_id = %id, error = %e, "Metadata update failed");
                false
            }
        }
    }
}
