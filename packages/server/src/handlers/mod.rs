pub mod dlq;
pub mod image;
pub mod media;
