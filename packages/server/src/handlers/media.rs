use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use common::{ImageRecord, MediaKey};
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::state::AppState;

const RENDITION_CACHE: &str = "public, max-age=31536000, immutable";
const ORIGINAL_CACHE: &str = "public, max-age=3600";

#[utoipa::path(
    get,
    path = "/media/images/{filename}",
    tag = "Media",
    operation_id = "getMedia",
    summary = "Fetch stored image bytes",
    description = "Streams an original (`{id}`) or a rendition (`{id}--{variant}.jpg`). \
        Supports ETag-based caching via If-None-Match. Renditions never change and are \
        cacheable indefinitely.",
    params(("filename" = String, Path, description = "Stored filename")),
    responses(
        (status = 200, description = "Image content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 404, description = "Unknown filename (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers))]
pub async fn get_media(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let key = MediaKey::Filename(filename);
    let record = state
        .media
        .stat(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No image with {key}")))?;

    let etag = etag_of(&record);
    if matches_etag(&headers, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    let object = state.media.open(&key).await?;
    let body = Body::from_stream(ReaderStream::new(object.reader));

    let cache_control = if object.record.is_original() {
        ORIGINAL_CACHE
    } else {
        RENDITION_CACHE
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, object.record.content_type.as_mime())
        .header(header::CONTENT_LENGTH, object.size.to_string())
        .header(header::ETAG, &etag)
        .header(header::CACHE_CONTROL, cache_control)
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

fn etag_of(record: &ImageRecord) -> String {
    format!("\"{}\"", record.content_hash)
}

/// `If-None-Match` may list several tags; any match (or `*`) counts.
fn matches_etag(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate.trim_start_matches("W/") == etag)
}
