pub mod catalog;
pub mod config;
#[cfg(feature = "sea-orm")]
pub mod database;
pub mod dlq;
#[cfg(feature = "sea-orm")]
pub mod entity;
pub mod media;
pub mod retry;
pub mod storage;
pub mod variant;

pub use catalog::{ImageCatalog, ImageRecord, MediaKey};
pub use dlq::{DlqEnvelope, DlqErrorCode};
pub use media::{MediaError, MediaStore, NewMedia};
pub use variant::{ImageContentType, Variant};

/// `message_type` of dead-lettered derivation jobs.
pub const DERIVATION_JOB: &str = "derivation_job";
