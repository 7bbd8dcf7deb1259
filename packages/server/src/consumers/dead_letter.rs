use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::{DlqEnvelope, DlqErrorCode};
use mq::{Delivery, JobQueue};
use sea_orm::DatabaseConnection;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::dlq::dlq_service;

const FAILURE_PAUSE: Duration = Duration::from_secs(1);

/// Persist dead-lettered jobs from `queue_name` until `shutdown` turns true.
pub async fn consume_dead_letters(
    db: DatabaseConnection,
    queue: Arc<dyn JobQueue>,
    queue_name: String,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(queue = %queue_name, "Starting dead-letter consumer");

    loop {
        let delivery = tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            delivery = queue.consume(&queue_name) => delivery,
        };

        let failed = match delivery {
            Ok(delivery) => match persist_dead_letter(&db, delivery).await {
                Ok(()) => false,
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Failed to persist dead letter");
                    true
                }
            },
            Err(e) => {
                error!(error = %e, "Failed to pull dead letter");
                true
            }
        };

        if failed {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = tokio::time::sleep(FAILURE_PAUSE) => {}
            }
        }
    }

    info!(queue = %queue_name, "Dead-letter consumer stopped");
}

/// Store one dead letter and settle its delivery. A body that is not an
/// envelope is stored as a malformed entry rather than dropped.
pub async fn persist_dead_letter(db: &DatabaseConnection, delivery: Delivery) -> anyhow::Result<()> {
    let envelope = match serde_json::from_str::<DlqEnvelope>(delivery.body()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(message_id = %delivery.id(), error = %e, "Dead letter is not an envelope");
            DlqEnvelope::permanent(
                delivery.id(),
                None,
                delivery.body(),
                DlqErrorCode::MalformedPayload,
                format!("unreadable dead-letter envelope: {e}"),
            )
        }
    };

    match dlq_service(db).record(&envelope).await {
        Ok(model) => {
            delivery.ack().await.context("Failed to ack dead letter")?;
            info!(
                id = model.id,
                message_id = %envelope.message_id,
                image_id = ?envelope.image_id,
                error_code = %envelope.error_code,
                "Persisted dead letter"
            );
            Ok(())
        }
        Err(e) => {
            delivery.reject().await.context("Failed to reject dead letter")?;
            Err(anyhow::Error::new(e).context("Failed to store dead letter"))
        }
    }
}
