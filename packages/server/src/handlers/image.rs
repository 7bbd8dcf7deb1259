use axum::Json;
use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::MediaKey;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::ingest::{ImageUpload, ingest};
use crate::models::image::{ImageCreatedResponse, ImageResponse};
use crate::state::AppState;

/// Multipart framing allowance on top of the largest accepted image.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn upload_body_limit(max_image_bytes: u64) -> DefaultBodyLimit {
    let max = usize::try_from(max_image_bytes).unwrap_or(usize::MAX);
    DefaultBodyLimit::max(max.saturating_add(MULTIPART_OVERHEAD))
}

#[utoipa::path(
    post,
    path = "/images",
    tag = "Images",
    operation_id = "uploadImage",
    summary = "Upload an image",
    description = "Stores the `image` part as a new original and queues derivation of its \
        renditions. The `userId` field is required. The part's content type must be \
        `image/jpeg` or `image/png`; when absent it is guessed from the part filename. \
        Returns as soon as the job is queued.",
    request_body(content_type = "multipart/form-data", description = "`image` file part and `userId` text field"),
    responses(
        (status = 201, description = "Image stored and queued", body = ImageCreatedResponse),
        (status = 400, description = "Missing field, bad type or size (VALIDATION_ERROR)", body = ErrorBody),
        (status = 500, description = "Storage or queue failure (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let limit = state.config.storage.max_blob_size;
    let mut image: Option<(Vec<u8>, Option<String>)> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("image") => {
                let declared = declared_type(&field);
                image = Some((read_bounded(field, limit).await?, declared));
            }
            Some("userId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read userId: {e}")))?;
                user_id = Some(text);
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let (bytes, declared) =
        image.ok_or_else(|| AppError::Validation("Missing 'image' field".into()))?;
    let upload = ImageUpload::new(&bytes, declared.as_deref(), user_id.as_deref(), limit)?;
    let record = ingest(
        &state.media,
        state.queue.as_ref(),
        &state.config.mq.queue_name,
        upload,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ImageCreatedResponse { id: record.id }),
    ))
}

/// The part's own content type, else a guess from its filename.
fn declared_type(field: &Field<'_>) -> Option<String> {
    field.content_type().map(str::to_string).or_else(|| {
        field
            .file_name()
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|mime| mime.to_string())
    })
}

async fn read_bounded(mut field: Field<'_>, limit: u64) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read image: {e}")))?
    {
        if (buf.len() + chunk.len()) as u64 > limit {
            return Err(AppError::Validation(format!(
                "Image exceeds the {limit} byte limit"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

#[utoipa::path(
    get,
    path = "/images/{id}",
    tag = "Images",
    operation_id = "getImage",
    summary = "Get an uploaded image",
    description = "Returns the original's metadata and links to all five renditions. Links to \
        renditions the worker has not produced (or never will, for short images) answer 404.",
    params(("id" = String, Path, description = "Image ID (UUID)")),
    responses(
        (status = 200, description = "Image metadata", body = ImageResponse),
        (status = 404, description = "Unknown image (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ImageResponse>, AppError> {
    let not_found = || AppError::NotFound(format!("Image {id} not found"));
    let uuid = Uuid::parse_str(&id).map_err(|_| not_found())?;

    let record = state
        .media
        .stat(&MediaKey::Id(uuid))
        .await?
        .filter(|record| record.is_original())
        .ok_or_else(not_found)?;

    Ok(Json(record.into()))
}
