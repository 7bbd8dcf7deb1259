use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use broccoli_queue::brokers::broker::BrokerMessage;
use broccoli_queue::queue::{BroccoliQueue, ConsumeOptions, RetryStrategy};
use common::config::MqAppConfig;
use tracing::warn;

use crate::delivery::{Delivery, Settle, Settlement};
use crate::error::MqError;
use crate::JobQueue;

pub struct RedisConfig {
    pub url: String,
    pub pool_size: u8,
    /// Broker-side cap on redeliveries. Kept above the worker's own retry
    /// budget so the worker always gets to dead-letter first.
    pub redelivery_attempts: u8,
}

impl From<&MqAppConfig> for RedisConfig {
    fn from(config: &MqAppConfig) -> Self {
        Self {
            url: config.url.clone(),
            pool_size: config.pool_size,
            redelivery_attempts: config.dlq.max_retries.saturating_add(2),
        }
    }
}

/// [`JobQueue`] on a Redis broker via `broccoli_queue`.
#[derive(Clone)]
pub struct RedisJobQueue {
    broker: Arc<BroccoliQueue>,
}

impl RedisJobQueue {
    pub async fn connect(config: &RedisConfig) -> Result<Self, MqError> {
        let broker = BroccoliQueue::builder(&config.url)
            .pool_connections(config.pool_size)
            .failed_message_retry_strategy(
                RetryStrategy::new()
                    .with_attempts(config.redelivery_attempts)
                    .retry_failed(true),
            )
            .build()
            .await?;
        Ok(Self {
            broker: Arc::new(broker),
        })
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn publish(&self, queue: &str, body: &str) -> Result<(), MqError> {
        self.broker
            .publish(queue, None, &body.to_string(), None)
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Delivery, MqError> {
        let options = ConsumeOptions::builder().auto_ack(false).build();
        let message: BrokerMessage<String> = self.broker.consume(queue, Some(options)).await?;
        Ok(Delivery::new(
            message.task_id.to_string(),
            message.payload.clone(),
            message.attempts,
            RedisSettler {
                broker: Arc::clone(&self.broker),
                queue: queue.to_string(),
                message: Mutex::new(Some(message)),
            },
        ))
    }
}

struct RedisSettler {
    broker: Arc<BroccoliQueue>,
    queue: String,
    message: Mutex<Option<BrokerMessage<String>>>,
}

impl RedisSettler {
    fn take(&self) -> Option<BrokerMessage<String>> {
        self.message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl Settle for RedisSettler {
    async fn settle(&self, settlement: Settlement) -> Result<(), MqError> {
        let message = self.take().ok_or(MqError::AlreadySettled)?;
        match settlement {
            Settlement::Ack => self.broker.acknowledge(&self.queue, message).await?,
            Settlement::Reject => self.broker.reject(&self.queue, message).await?,
        }
        Ok(())
    }
}

/// Best effort only: the spawned reject dies with the runtime. Consumers that
/// can be cut off should settle through [`crate::Reclaim`] instead.
impl Drop for RedisSettler {
    fn drop(&mut self) {
        let Some(message) = self.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(queue = %self.queue, "Abandoned delivery outside a runtime; left in processing");
            return;
        };
        let broker = Arc::clone(&self.broker);
        let queue = self.queue.clone();
        runtime.spawn(async move {
            if let Err(e) = broker.reject(&queue, message).await {
                warn!(queue = %queue, error = %e, "Failed to return abandoned delivery");
            }
        });
    }
}
