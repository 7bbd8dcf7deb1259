use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mq::{JobQueue, Reclaim};
use tokio::sync::{Semaphore, watch};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::processor::JobProcessor;

const CONSUME_ERROR_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub queue_name: String,
    pub concurrency: usize,
    pub shutdown_grace: Duration,
}

impl ConsumerSettings {
    pub fn new(queue_name: impl Into<String>, worker: &WorkerConfig) -> Self {
        Self {
            queue_name: queue_name.into(),
            concurrency: worker.concurrency.max(1),
            shutdown_grace: Duration::from_secs(worker.shutdown_grace_secs),
        }
    }
}

/// Counters reported when the loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub started: usize,
    pub failed: usize,
    /// Jobs still running when the grace period ran out.
    pub aborted: usize,
    /// Deliveries the loop rejected itself because their job ended
    /// without settling them.
    pub returned: usize,
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Pull deliveries and run each as its own task, at most
/// `settings.concurrency` at a time, until `shutdown` turns true.
///
/// After shutdown no new deliveries are pulled. In-flight jobs get
/// `settings.shutdown_grace` to finish; any still running are aborted
/// and their deliveries are rejected before this returns, so the broker
/// redelivers them even if the process exits right after.
pub async fn run(
    processor: Arc<JobProcessor>,
    queue: Arc<dyn JobQueue>,
    settings: ConsumerSettings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ConsumerStats> {
    let permits = Arc::new(Semaphore::new(settings.concurrency));
    let mut jobs = JoinSet::new();
    let mut stats = ConsumerStats::default();
    let mut in_flight: HashMap<task::Id, Reclaim> = HashMap::new();

    info!(
        queue = %settings.queue_name,
        concurrency = settings.concurrency,
        "Consumer started"
    );

    loop {
        while let Some(finished) = jobs.try_join_next_with_id() {
            record(&mut stats, &mut in_flight, finished).await;
        }

        let permit = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let delivery = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            delivery = queue.consume(&settings.queue_name) => delivery,
        };

        match delivery {
            Ok(delivery) => {
                let processor = Arc::clone(&processor);
                let reclaim = delivery.reclaim_handle();
                stats.started += 1;
                let job = jobs.spawn(async move {
                    let _permit = permit;
                    processor.handle(delivery).await.map(|_| ())
                });
                in_flight.insert(job.id(), reclaim);
            }
            Err(e) => {
                error!(error = %e, "Failed to pull delivery");
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => break,
                    _ = tokio::time::sleep(CONSUME_ERROR_PAUSE) => {}
                }
            }
        }
    }

    info!(in_flight = jobs.len(), "Stopped pulling; draining in-flight jobs");
    let drained = tokio::time::timeout(settings.shutdown_grace, async {
        while let Some(finished) = jobs.join_next_with_id().await {
            record(&mut stats, &mut in_flight, finished).await;
        }
    })
    .await;

    if drained.is_err() {
        stats.aborted = jobs.len();
        warn!(
            aborted = stats.aborted,
            "Grace period elapsed; aborting unfinished jobs"
        );
        jobs.abort_all();
        while let Some(finished) = jobs.join_next_with_id().await {
            record(&mut stats, &mut in_flight, finished).await;
        }
    }

    info!(
        started = stats.started,
        failed = stats.failed,
        aborted = stats.aborted,
        returned = stats.returned,
        "Consumer stopped"
    );
    Ok(stats)
}

/// Account for a finished job and make sure its delivery got settled.
async fn record(
    stats: &mut ConsumerStats,
    in_flight: &mut HashMap<task::Id, Reclaim>,
    finished: std::result::Result<(task::Id, Result<()>), JoinError>,
) {
    let id = match &finished {
        Ok((id, _)) => *id,
        Err(e) => e.id(),
    };
    match finished {
        Ok((_, Ok(()))) => {}
        Ok((_, Err(e))) => {
            stats.failed += 1;
            error!(error = %e, "Job handling failed");
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => {
            stats.failed += 1;
            error!(error = %e, "Job task panicked");
        }
    }

    let Some(reclaim) = in_flight.remove(&id) else {
        return;
    };
    match reclaim.reject_if_unsettled().await {
        Ok(true) => {
            stats.returned += 1;
            warn!("Returned unsettled delivery to the queue");
        }
        Ok(false) => {}
        Err(e) => error!(error = %e, "Failed to return unsettled delivery"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{DeriveSettings, Deriver};
    use crate::testing::{media_store, png_bytes};
    use async_trait::async_trait;
    use common::catalog::{CatalogError, ImageRecord, MediaKey, NewImageRecord, SourceMetadata};
    use common::retry::RetryTracker;
    use common::storage::FilesystemBlobStore;
    use common::{ImageCatalog, ImageContentType, MediaStore, NewMedia};
    use mq::MemoryJobQueue;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    /// Catalog whose every call hangs, like a database that stopped answering.
    struct StalledCatalog;

    #[async_trait]
    impl ImageCatalog for StalledCatalog {
        async fn insert(&self, _: NewImageRecord) -> std::result::Result<ImageRecord, CatalogError> {
            std::future::pending().await
        }
        async fn upsert_rendition(
            &self,
            _: NewImageRecord,
        ) -> std::result::Result<ImageRecord, CatalogError> {
            std::future::pending().await
        }
        async fn find(&self, _: &MediaKey) -> std::result::Result<Option<ImageRecord>, CatalogError> {
            std::future::pending().await
        }
        async fn update_source_metadata(
            &self,
            _: Uuid,
            _: SourceMetadata,
        ) -> std::result::Result<bool, CatalogError> {
            std::future::pending().await
        }
        async fn renditions_of(&self, _: Uuid) -> std::result::Result<Vec<ImageRecord>, CatalogError> {
            std::future::pending().await
        }
    }

    fn processor_over(media: MediaStore, queue: &MemoryJobQueue) -> Arc<JobProcessor> {
        Arc::new(JobProcessor::new(
            Deriver::new(media, DeriveSettings::default()),
            Arc::new(queue.clone()),
            "images_dlq",
            Arc::new(Mutex::new(RetryTracker::new(
                3,
                Duration::from_millis(1),
                Duration::from_millis(1),
            ))),
        ))
    }

    fn settings(concurrency: usize) -> ConsumerSettings {
        ConsumerSettings {
            queue_name: "images".into(),
            concurrency,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn processes_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (media, catalog) = media_store(&dir).await;
        let queue = MemoryJobQueue::new();

        let mut ids = Vec::new();
        for height in [100, 300, 700, 1200] {
            let record = media
                .put(NewMedia::original(&png_bytes(40, height), ImageContentType::Png, "u"))
                .await
                .unwrap();
            queue.publish("images", &record.id.to_string()).await.unwrap();
            ids.push(record.id);
        }

        let processor = processor_over(media, &queue);
        let (tx, rx) = watch::channel(false);
        let consumer = tokio::spawn(run(processor, Arc::new(queue.clone()), settings(2), rx));

        tokio::time::timeout(Duration::from_secs(30), async {
            while queue.acked("images") < ids.len() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("all jobs acknowledged");
        tx.send(true).unwrap();

        let stats = consumer.await.unwrap().unwrap();
        assert_eq!(stats.started, 4);
        assert_eq!(stats.failed, 0);
        assert_eq!((stats.aborted, stats.returned), (0, 0));

        let counts: Vec<usize> = {
            let mut counts = Vec::new();
            for id in &ids {
                counts.push(catalog.renditions_of(*id).await.unwrap().len());
            }
            counts
        };
        assert_eq!(counts, vec![1, 3, 4, 5]);
        for id in &ids {
            for rendition in catalog.renditions_of(*id).await.unwrap() {
                assert_eq!(rendition.source_id, Some(*id));
                assert!(rendition.filename.starts_with(&id.to_string()));
            }
        }
    }

    #[tokio::test]
    async fn jobs_cut_off_by_grace_period_are_rejected_before_return() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FilesystemBlobStore::new(dir.path(), 1024).await.unwrap();
        let media = MediaStore::new(Arc::new(blobs), Arc::new(StalledCatalog));
        let queue = MemoryJobQueue::new();
        let id = Uuid::now_v7().to_string();
        queue.publish("images", &id).await.unwrap();

        let settings = ConsumerSettings {
            shutdown_grace: Duration::from_millis(20),
            ..settings(1)
        };
        let (tx, rx) = watch::channel(false);
        let consumer = tokio::spawn(run(
            processor_over(media, &queue),
            Arc::new(queue.clone()),
            settings,
            rx,
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while queue.in_flight("images") == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job picked up");
        tx.send(true).unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!((stats.started, stats.aborted, stats.returned), (1, 1, 1));
        // Already back on the queue through an explicit reject, not a drop.
        assert_eq!(queue.pending("images"), vec![id]);
        assert_eq!((queue.rejected("images"), queue.abandoned("images")), (1, 0));
        assert_eq!(queue.in_flight("images"), 0);
    }

    #[tokio::test]
    async fn idle_consumer_stops_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let (media, _) = media_store(&dir).await;
        let queue = MemoryJobQueue::new();
        let processor = processor_over(media, &queue);
        let (tx, rx) = watch::channel(false);
        let consumer = tokio::spawn(run(processor, Arc::new(queue.clone()), settings(1), rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stats, ConsumerStats::default());
    }
}
