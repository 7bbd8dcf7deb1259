use std::sync::Arc;

use common::retry::{RetryDecision, RetryTracker};
use common::{DlqEnvelope, DlqErrorCode};
use mq::{Delivery, JobQueue};
use tokio::sync::Mutex;
use tracing::{Span, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, WorkerError};
use crate::pipeline::{DerivationReport, Deriver};

/// What happened to one delivery.
#[derive(Debug)]
pub enum JobOutcome {
    Completed(DerivationReport),
    /// Published to the DLQ and acknowledged.
    DeadLettered(DlqErrorCode),
    /// Rejected after backoff, for the broker to redeliver.
    Requeued { attempt: u8 },
}

/// Runs the derivation pipeline for a delivery and settles it.
///
/// Transient failures are retried through the broker up to the tracker's
/// budget. Everything else ends acknowledged, either completed or
/// dead-lettered.
pub struct JobProcessor {
    deriver: Deriver,
    queue: Arc<dyn JobQueue>,
    dlq_queue: String,
    retries: Arc<Mutex<RetryTracker>>,
}

impl JobProcessor {
    pub fn new(
        deriver: Deriver,
        queue: Arc<dyn JobQueue>,
        dlq_queue: impl Into<String>,
        retries: Arc<Mutex<RetryTracker>>,
    ) -> Self {
        Self {
            deriver,
            queue,
            dlq_queue: dlq_queue.into(),
            retries,
        }
    }

    #[instrument(
        skip_all,
        fields(
            message_id = %delivery.id(),
            redeliveries = delivery.attempts(),
            image_id = tracing::field::Empty,
        )
    )]
    pub async fn handle(&self, delivery: Delivery) -> Result<JobOutcome> {
        let payload = delivery.body().trim();
        let Ok(id) = Uuid::parse_str(payload) else {
            error!(payload, "Job body is not an image id");
            let envelope = DlqEnvelope::permanent(
                delivery.id(),
                None,
                delivery.body(),
                DlqErrorCode::MalformedPayload,
                format!("job body is not an image id: {payload:?}"),
            );
            return self.dead_letter(delivery, envelope).await;
        };
        Span::current().record("image_id", tracing::field::display(id));

        match self.deriver.derive(id).await {
            Ok(report) => {
                self.retries.lock().await.clear(id);
                delivery.ack().await?;
                info!(
                    width = report.source.width,
                    height = report.source.height,
                    source_bytes = report.source_bytes,
                    renditions = report.renditions.len(),
                    metadata_updated = report.metadata_updated,
                    "Derivation complete"
                );
                Ok(JobOutcome::Completed(report))
            }
            Err(e) if !e.is_retriable() => {
                self.retries.lock().await.clear(id);
                let code = e.dlq_code();
                error!(error = %e, %code, "Job failed permanently");
                let envelope = DlqEnvelope::permanent(
                    delivery.id(),
                    Some(id),
                    delivery.body(),
                    code,
                    e.to_string(),
                );
                self.dead_letter(delivery, envelope).await
            }
            Err(e) => {
                let decision = self.retries.lock().await.record_failure(id, e.to_string());
                match decision {
                    RetryDecision::Retry { attempt, delay } => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Transient failure, returning job to queue"
                        );
                        tokio::time::sleep(delay).await;
                        delivery.reject().await?;
                        Ok(JobOutcome::Requeued { attempt })
                    }
                    RetryDecision::Exhausted { history } => {
                        error!(attempts = history.len(), error = %e, "Retries exhausted");
                        let envelope =
                            DlqEnvelope::exhausted(delivery.id(), id, delivery.body(), history);
                        self.dead_letter(delivery, envelope).await
                    }
                }
            }
        }
    }

    /// Publish `envelope` to the DLQ, then ack. If the DLQ publish fails the
    /// delivery is rejected instead, so the job is not lost.
    async fn dead_letter(&self, delivery: Delivery, envelope: DlqEnvelope) -> Result<JobOutcome> {
        let code = envelope.error_code;
        let body =
            serde_json::to_string(&envelope).map_err(|e| WorkerError::Envelope(e.to_string()))?;

        if let Err(e) = self.queue.publish(&self.dlq_queue, &body).await {
            error!(error = %e, dlq = %self.dlq_queue, "DLQ publish failed, returning job to queue");
            delivery.reject().await?;
            return Err(e.into());
        }
        delivery.ack().await?;
        Ok(JobOutcome::DeadLettered(code))
    }
}
