use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::entity::dead_letter_message;

use super::shared::Pagination;

/// Query parameters for listing DLQ messages.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListDlqParams {
    /// Filter by resolved status.
    #[param(example = false)]
    pub resolved: Option<bool>,
    /// Filter by error code.
    #[param(example = "UNDECODABLE_IMAGE")]
    pub error_code: Option<String>,
    /// Page number (1-indexed).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

/// DLQ message summary for list views.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqMessageResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "0193a1f2-...")]
    pub message_id: String,
    #[schema(example = "derivation_job")]
    pub message_type: String,
    /// Image the job was for (null when the job body was not an id).
    pub image_id: Option<Uuid>,
    #[schema(example = "MAX_RETRIES_EXCEEDED")]
    pub error_code: String,
    #[schema(example = "catalog backend error: connection refused")]
    pub error_message: String,
    #[schema(example = 3)]
    pub retry_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[schema(example = false)]
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<dead_letter_message::Model> for DlqMessageResponse {
    fn from(m: dead_letter_message::Model) -> Self {
        Self {
            id: m.id,
            message_id: m.message_id,
            message_type: m.message_type,
            image_id: m.image_id,
            error_code: m.error_code,
            error_message: m.error_message,
            retry_count: m.retry_count,
            first_failed_at: m.first_failed_at,
            created_at: m.created_at,
            resolved: m.resolved,
            resolved_at: m.resolved_at,
        }
    }
}

/// Full DLQ message details.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqMessageDetailResponse {
    #[serde(flatten)]
    pub summary: DlqMessageResponse,
    /// Job body exactly as the worker received it.
    pub payload: String,
    /// Retry history: array of {attempt, error, timestamp}.
    pub retry_history: serde_json::Value,
}

impl From<dead_letter_message::Model> for DlqMessageDetailResponse {
    fn from(mut m: dead_letter_message::Model) -> Self {
        let payload = std::mem::take(&mut m.payload);
        let retry_history = std::mem::take(&mut m.retry_history);
        Self {
            summary: m.into(),
            payload,
            retry_history,
        }
    }
}

/// Paginated list of DLQ messages.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqListResponse {
    pub data: Vec<DlqMessageResponse>,
    pub pagination: Pagination,
}

/// Response for retry action.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqRetryResponse {
    #[schema(example = "Derivation requeued for image 01920c5e-7a3b-7c4d-9e8f-0a1b2c3d4e5f")]
    pub message: String,
}
