use std::path::PathBuf;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;

/// Prefix for environment overrides, e.g. `LIGHTBOX__MQ__URL`.
pub const ENV_PREFIX: &str = "LIGHTBOX";
/// Environment variable naming the config file (without extension).
pub const CONFIG_PATH_ENV: &str = "LIGHTBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/config";

/// Config file then environment. Callers add their defaults on top, which
/// the `config` crate always ranks below every source.
pub fn layered() -> ConfigBuilder<DefaultState> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    config::Config::builder()
        .add_source(File::with_name(&path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    #[serde(default = "default_mq_url")]
    pub url: String,
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Derivation jobs: server publishes, workers consume.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    /// Dead-lettered jobs: workers publish, server consumes.
    #[serde(default = "default_dlq_queue_name")]
    pub dlq_queue_name: String,
    #[serde(default)]
    pub dlq: DlqConfig,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_queue_name() -> String {
    "images".into()
}
fn default_dlq_queue_name() -> String {
    "images_dlq".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            queue_name: default_queue_name(),
            dlq_queue_name: default_dlq_queue_name(),
            dlq: DlqConfig::default(),
        }
    }
}

/// Poison-job handling.
#[derive(Debug, Deserialize, Clone)]
pub struct DlqConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_cleanup_interval_secs")]
    pub retry_cleanup_interval_secs: u64,
    #[serde(default = "default_retry_max_age_secs")]
    pub retry_max_age_secs: u64,
    /// An original still without metadata this long after upload, and with
    /// no open dead letter, is treated as a lost job.
    #[serde(default = "default_stuck_job_timeout_secs")]
    pub stuck_job_timeout_secs: u64,
    #[serde(default = "default_stuck_job_scan_interval_secs")]
    pub stuck_job_scan_interval_secs: u64,
}

fn default_max_retries() -> u8 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_retry_cleanup_interval_secs() -> u64 {
    300
}
fn default_retry_max_age_secs() -> u64 {
    3600
}
fn default_stuck_job_timeout_secs() -> u64 {
    900
}
fn default_stuck_job_scan_interval_secs() -> u64 {
    60
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_cleanup_interval_secs: default_retry_cleanup_interval_secs(),
            retry_max_age_secs: default_retry_max_age_secs(),
            stuck_job_timeout_secs: default_stuck_job_timeout_secs(),
            stuck_job_scan_interval_secs: default_stuck_job_scan_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,
    /// Largest accepted blob in bytes.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
}

fn default_blob_dir() -> PathBuf {
    PathBuf::from("./data/blobs")
}
fn default_max_blob_size() -> u64 {
    32 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_dir: default_blob_dir(),
            max_blob_size: default_max_blob_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}
