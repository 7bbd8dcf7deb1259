use std::sync::Arc;

use common::MediaStore;
use mq::JobQueue;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub media: MediaStore,
    pub queue: Arc<dyn JobQueue>,
    /// Dead-letter records.
    pub db: DatabaseConnection,
    pub config: AppConfig,
}
