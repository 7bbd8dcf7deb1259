use std::sync::Arc;

use anyhow::Context;
use common::MediaStore;
use common::catalog::SeaOrmCatalog;
use common::storage::FilesystemBlobStore;
use mq::{JobQueue, RedisConfig, RedisJobQueue};
use tokio::sync::watch;
use tracing::{Level, error, info};

use server::config::AppConfig;
use server::consumers::consume_dead_letters;
use server::dlq::run_stuck_job_detector;
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = server::database::init_db(&config.database)
        .await
        .context("Failed to initialize database")?;
    let blobs = FilesystemBlobStore::new(&config.storage.blob_dir, config.storage.max_blob_size)
        .await
        .context("Failed to open blob store")?;
    let media = MediaStore::new(Arc::new(blobs), Arc::new(SeaOrmCatalog::new(db.clone())));

    let queue: Arc<dyn JobQueue> = Arc::new(
        RedisJobQueue::connect(&RedisConfig::from(&config.mq))
            .await
            .context("Failed to initialize MQ")?,
    );
    info!(
        queue_name = %config.mq.queue_name,
        dlq_queue_name = %config.mq.dlq_queue_name,
        "MQ connected"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dlq_consumer = tokio::spawn(consume_dead_letters(
        db.clone(),
        Arc::clone(&queue),
        config.mq.dlq_queue_name.clone(),
        shutdown_rx.clone(),
    ));
    let stuck_detector = tokio::spawn(run_stuck_job_detector(
        db.clone(),
        config.mq.dlq.clone(),
        shutdown_rx,
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState {
        media,
        queue,
        db,
        config,
    };
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    let _ = dlq_consumer.await;
    let _ = stuck_detector.await;
    info!("Server stopped");
    Ok(())
}
