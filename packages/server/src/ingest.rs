//! Accepting an uploaded original and queueing its derivation.

use common::{ImageContentType, ImageRecord, MediaError, MediaStore, NewMedia};
use mq::{JobQueue, MqError};
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The upload itself is unacceptable. Nothing was written.
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Media(#[from] MediaError),
    /// The original is stored but no job was queued for it.
    #[error("image {id} stored but its derivation job was not published: {source}")]
    Publish { id: Uuid, source: MqError },
}

/// A validated upload, ready to store.
#[derive(Debug)]
pub struct ImageUpload<'a> {
    bytes: &'a [u8],
    content_type: ImageContentType,
    owner_id: String,
}

impl<'a> ImageUpload<'a> {
    pub fn new(
        bytes: &'a [u8],
        content_type: Option<&str>,
        owner_id: Option<&str>,
        max_bytes: u64,
    ) -> Result<Self, IngestError> {
        let owner_id = owner_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IngestError::Invalid("userId is required".into()))?;

        let declared = content_type
            .ok_or_else(|| IngestError::Invalid("Image content type is missing".into()))?;
        let content_type = ImageContentType::from_mime(declared).ok_or_else(|| {
            IngestError::Invalid(format!("Unsupported content type: {declared}"))
        })?;

        if bytes.is_empty() {
            return Err(IngestError::Invalid("Image is empty".into()));
        }
        if bytes.len() as u64 > max_bytes {
            return Err(IngestError::Invalid(format!(
                "Image is {} bytes; the limit is {max_bytes} bytes",
                bytes.len()
            )));
        }

        Ok(Self {
            bytes,
            content_type,
            owner_id: owner_id.to_string(),
        })
    }

    pub fn content_type(&self) -> ImageContentType {
        self.content_type
    }
}

/// Store `upload` as a new original, then publish its id to `queue_name`.
///
/// The publish happens only after the write has produced an id. A failed
/// publish leaves the original in place.
#[instrument(skip_all, fields(owner_id = %upload.owner_id, content_type = %upload.content_type))]
pub async fn ingest(
    media: &MediaStore,
    queue: &dyn JobQueue,
    queue_name: &str,
    upload: ImageUpload<'_>,
) -> Result<ImageRecord, IngestError> {
    let record = media
        .put(NewMedia::original(
            upload.bytes,
            upload.content_type,
            upload.owner_id,
        ))
        .await?;

    if let Err(source) = queue.publish(queue_name, &record.id.to_string()).await {
        error!(image_id = %record.id, error = %source, "Failed to publish derivation job");
        return Err(IngestError::Publish {
            id: record.id,
            source,
        });
    }

    info!(image_id = %record.id, bytes = upload.bytes.len(), "Image accepted");
    Ok(record)
}
