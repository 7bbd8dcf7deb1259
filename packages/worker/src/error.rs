use common::{DlqErrorCode, MediaError, Variant};
use thiserror::Error;
use uuid::Uuid;

use crate::imaging::ImagingError;

/// Why a single derivation run stopped.
#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("original {0} not found")]
    OriginalNotFound(Uuid),

    #[error("original {id} exceeds {limit} bytes")]
    SourceTooLarge { id: Uuid, limit: u64 },

    #[error("original {id} is not a decodable image: {source}")]
    Undecodable {
        id: Uuid,
        #[source]
        source: ImagingError,
    },

    #[error("failed to encode {variant} rendition: {source}")]
    Encode {
        variant: Variant,
        #[source]
        source: ImagingError,
    },

    #[error("storage error: {0}")]
    Media(#[from] MediaError),

    #[error("imaging task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DeriveError {
    /// Whether a redelivery could succeed where this run failed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::OriginalNotFound(_) | Self::SourceTooLarge { .. } | Self::Undecodable { .. } => {
                false
            }
            Self::Encode { .. } | Self::Media(_) | Self::Task(_) => true,
        }
    }

    /// Dead-letter code for a non-retriable failure.
    pub fn dlq_code(&self) -> DlqErrorCode {
        match self {
            Self::OriginalNotFound(_) => DlqErrorCode::OriginalNotFound,
            Self::SourceTooLarge { .. } => DlqErrorCode::SourceTooLarge,
            Self::Undecodable { .. } => DlqErrorCode::UndecodableImage,
            _ => DlqErrorCode::MaxRetriesExceeded,
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("MQ error: {0}")]
    Mq(#[from] mq::MqError),

    #[error("failed to serialize DLQ envelope: {0}")]
    Envelope(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
