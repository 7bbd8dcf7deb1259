pub mod config;
pub mod consumer;
pub mod error;
pub mod imaging;
pub mod ladder;
pub mod pipeline;
pub mod processor;

#[cfg(test)]
mod testing;

pub use config::{WorkerAppConfig, WorkerConfig};
pub use error::{DeriveError, Result, WorkerError};
pub use pipeline::{DerivationReport, DeriveSettings, Deriver};
pub use processor::{JobOutcome, JobProcessor};
