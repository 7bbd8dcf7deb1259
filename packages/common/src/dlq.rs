use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retry::RetryAttempt;

/// Why a derivation job was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqErrorCode {
    /// Transient failures outlasted the retry budget.
    MaxRetriesExceeded,
    /// The job body is not an image id.
    MalformedPayload,
    /// No original exists under the job's id.
    OriginalNotFound,
    /// The original could not be decoded.
    UndecodableImage,
    /// The original is larger than the worker will buffer.
    SourceTooLarge,
    /// The original never got its renditions and no worker is holding the job.
    StuckJob,
}

impl DlqErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::OriginalNotFound => "ORIGINAL_NOT_FOUND",
            Self::UndecodableImage => "UNDECODABLE_IMAGE",
            Self::SourceTooLarge => "SOURCE_TOO_LARGE",
            Self::StuckJob => "STUCK_JOB",
        }
    }
}

impl std::fmt::Display for DlqErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed derivation job on its way to the dead-letter queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Broker id of the failed delivery.
    pub message_id: String,
    /// `None` when the job body did not parse as an id.
    pub image_id: Option<Uuid>,
    /// Job body exactly as received.
    pub payload: String,
    pub error_code: DlqErrorCode,
    pub error_message: String,
    pub retry_history: Vec<RetryAttempt>,
}

impl DlqEnvelope {
    /// Envelope for a failure that retrying cannot fix.
    pub fn permanent(
        message_id: impl Into<String>,
        image_id: Option<Uuid>,
        payload: impl Into<String>,
        error_code: DlqErrorCode,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            image_id,
            payload: payload.into(),
            error_code,
            error_message: error_message.into(),
            retry_history: Vec::new(),
        }
    }

    /// Envelope for a job whose transient failures ran out of retries.
    pub fn exhausted(
        message_id: impl Into<String>,
        image_id: Uuid,
        payload: impl Into<String>,
        retry_history: Vec<RetryAttempt>,
    ) -> Self {
        let error_message = retry_history
            .last()
            .map(|a| a.error.clone())
            .unwrap_or_else(|| "retries exhausted".to_string());
        Self {
            message_id: message_id.into(),
            image_id: Some(image_id),
            payload: payload.into(),
            error_code: DlqErrorCode::MaxRetriesExceeded,
            error_message,
            retry_history,
        }
    }
}
