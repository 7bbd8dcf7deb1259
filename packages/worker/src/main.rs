use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::MediaStore;
use common::catalog::SeaOrmCatalog;
use common::retry::{RetryTracker, spawn_eviction_task};
use common::storage::FilesystemBlobStore;
use mq::{JobQueue, RedisConfig, RedisJobQueue};
use tokio::sync::{Mutex, watch};
use tracing::{error, info};
use worker::consumer::{self, ConsumerSettings};
use worker::{DeriveSettings, Deriver, JobProcessor, WorkerAppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = WorkerAppConfig::load().context("Failed to load config")?;
    info!(worker_id = %config.worker.id, "Worker starting");

    let db = common::database::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;
    let blobs = FilesystemBlobStore::new(&config.storage.blob_dir, config.storage.max_blob_size)
        .await
        .context("Failed to open blob store")?;
    let media = MediaStore::new(Arc::new(blobs), Arc::new(SeaOrmCatalog::new(db)));

    let queue: Arc<dyn JobQueue> = Arc::new(
        RedisJobQueue::connect(&RedisConfig::from(&config.mq))
            .await
            .context("Failed to initialize MQ")?,
    );
    info!(
        queue_name = %config.mq.queue_name,
        dlq_queue_name = %config.mq.dlq_queue_name,
        max_retries = config.mq.dlq.max_retries,
        concurrency = config.worker.concurrency,
        "MQ connected"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            // Dropping the sender would read as a shutdown request.
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let retries = Arc::new(Mutex::new(RetryTracker::from_config(&config.mq.dlq)));
    let eviction = spawn_eviction_task(
        Arc::clone(&retries),
        Duration::from_secs(config.mq.dlq.retry_cleanup_interval_secs),
        Duration::from_secs(config.mq.dlq.retry_max_age_secs),
        shutdown_rx.clone(),
    );

    let processor = Arc::new(JobProcessor::new(
        Deriver::new(media, DeriveSettings::from(&config.worker)),
        Arc::clone(&queue),
        config.mq.dlq_queue_name.clone(),
        retries,
    ));
    let settings = ConsumerSettings::new(config.mq.queue_name.clone(), &config.worker);

    let stats = consumer::run(processor, queue, settings, shutdown_rx)
        .await
        .context("Consumer failed")?;
    let _ = eviction.await;

    info!(
        worker_id = %config.worker.id,
        jobs = stats.started,
        failed = stats.failed,
        returned = stats.returned,
        "Worker stopped"
    );
    Ok(())
}
