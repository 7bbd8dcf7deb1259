mod common;
mod dlq;
mod images;
mod media;
mod pipeline;
