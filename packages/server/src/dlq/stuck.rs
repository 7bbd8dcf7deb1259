use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::DlqConfig;
use common::entity::{dead_letter_message, image_file};
use common::{DlqEnvelope, DlqErrorCode};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use super::DlqService;

const SCAN_BATCH: u64 = 100;

/// Failures a fresh attempt cannot fix. Once an image has dead-lettered
/// with one of these it is never flagged as stuck again.
const PERMANENT_CODES: [DlqErrorCode; 4] = [
    DlqErrorCode::MalformedPayload,
    DlqErrorCode::OriginalNotFound,
    DlqErrorCode::UndecodableImage,
    DlqErrorCode::SourceTooLarge,
];

/// Periodically dead-letter originals whose derivation job was lost, for
/// example because a worker died holding it. Runs until `shutdown` is true.
pub async fn run_stuck_job_detector(
    db: DatabaseConnection,
    config: DlqConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let scan_interval = Duration::from_secs(config.stuck_job_scan_interval_secs.max(1));
    info!(
        timeout_secs = config.stuck_job_timeout_secs,
        scan_interval_secs = config.stuck_job_scan_interval_secs,
        "Starting stuck job detector"
    );

    let mut interval = tokio::time::interval(scan_interval);
    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            _ = interval.tick() => {}
        }

        match flag_stuck_jobs(&db, &config).await {
            Ok(0) => {}
            Ok(flagged) => info!(flagged, "Dead-lettered stuck derivations"),
            Err(e) => error!(error = %e, "Stuck job detection failed"),
        }
    }
    info!("Stuck job detector stopped");
}

/// One scan. An original counts as stuck when it is older than the timeout
/// and still has no `size_bytes`, which the worker sets as its last step.
/// Returns how many originals were dead-lettered.
pub async fn flag_stuck_jobs(db: &DatabaseConnection, config: &DlqConfig) -> anyhow::Result<usize> {
    let Some(threshold) = i64::try_from(config.stuck_job_timeout_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
    else {
        return Ok(0);
    };

    let candidates: Vec<Uuid> = image_file::Entity::find()
        .filter(image_file::Column::SourceId.is_null())
        .filter(image_file::Column::SizeBytes.is_null())
        .filter(image_file::Column::CreatedAt.lt(threshold))
        .order_by_asc(image_file::Column::CreatedAt)
        .limit(SCAN_BATCH)
        .all(db)
        .await?
        .into_iter()
        .map(|image| image.id)
        .collect();

    let mut flagged = 0;
    for id in candidates {
        match flag_if_stuck(db, id, threshold, config.stuck_job_timeout_secs).await {
            Ok(true) => flagged += 1,
            Ok(false) => {}
            Err(e) => error!(image_id = %id, error = %e, "Failed to handle stuck image"),
        }
    }
    Ok(flagged)
}

async fn flag_if_stuck(
    db: &DatabaseConnection,
    id: Uuid,
    threshold: DateTime<Utc>,
    timeout_secs: u64,
) -> anyhow::Result<bool> {
    let txn = db.begin().await?;

    let image = image_file::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let Some(image) = image.filter(|image| image.size_bytes.is_none()) else {
        txn.rollback().await?;
        return Ok(false);
    };

    let history = dead_letter_message::Entity::find()
        .filter(dead_letter_message::Column::ImageId.eq(image.id))
        .order_by_asc(dead_letter_message::Column::CreatedAt)
        .all(&txn)
        .await?;
    if !needs_flag(&history, threshold) {
        txn.rollback().await?;
        return Ok(false);
    }

    let envelope = DlqEnvelope::permanent(
        format!("stuck-{id}-{}", history.len() + 1),
        Some(id),
        id.to_string(),
        DlqErrorCode::StuckJob,
        format!("No renditions {timeout_secs}s after upload and no worker holds the job"),
    );
    DlqService::new(&txn).record(&envelope).await?;
    txn.commit().await?;

    info!(image_id = %id, "Moved stuck image to DLQ");
    Ok(true)
}

/// Decide from an image's dead-letter history, oldest first, whether a
/// missing derivation should be flagged now.
fn needs_flag(history: &[dead_letter_message::Model], threshold: DateTime<Utc>) -> bool {
    if history.iter().any(|entry| !entry.resolved) {
        return false;
    }
    let Some(latest) = history.last() else {
        return true;
    };
    if PERMANENT_CODES
        .iter()
        .any(|code| code.as_str() == latest.error_code)
    {
        return false;
    }
    // A retry resolves its entry and republishes; give that job a full
    // timeout of its own.
    latest.resolved_at.is_none_or(|at| at < threshold)
}
