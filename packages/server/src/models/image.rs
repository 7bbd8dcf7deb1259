use common::{ImageRecord, Variant};
use serde::Serialize;
use uuid::Uuid;

/// Public path of a stored file, relative to the server root.
pub fn media_url(filename: &str) -> String {
    format!("/api/v1/media/images/{filename}")
}

/// Returned by a successful upload.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ImageCreatedResponse {
    #[schema(example = "01920c5e-7a3b-7c4d-9e8f-0a1b2c3d4e5f")]
    pub id: Uuid,
}

/// An uploaded original and where to fetch its renditions.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub id: Uuid,
    /// Location of the original as uploaded.
    #[schema(example = "/api/v1/media/images/01920c5e-7a3b-7c4d-9e8f-0a1b2c3d4e5f")]
    pub url: String,
    #[schema(example = "image/png")]
    pub content_type: String,
    #[schema(example = "user-42")]
    pub owner_id: String,
    /// Set once a worker has read the original.
    #[schema(example = 482113)]
    pub size_bytes: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// One link per ladder rung, largest first. Rungs taller than the
    /// original are never produced and answer 404.
    pub download_links: Vec<String>,
}

impl From<ImageRecord> for ImageResponse {
    fn from(record: ImageRecord) -> Self {
        let download_links = Variant::ALL
            .iter()
            .map(|variant| media_url(&variant.filename(record.id)))
            .collect();
        Self {
            id: record.id,
            url: media_url(&record.filename),
            content_type: record.content_type.to_string(),
            owner_id: record.owner_id,
            size_bytes: record.size_bytes,
            width: record.width,
            height: record.height,
            download_links,
        }
    }
}
