use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MqError;

/// Final decision on a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Remove the message from the queue.
    Ack,
    /// Hand the message back for redelivery.
    Reject,
}

/// Broker-side handle that applies a [`Settlement`].
#[async_trait]
pub trait Settle: Send + Sync {
    async fn settle(&self, settlement: Settlement) -> Result<(), MqError>;
}

/// A message pulled from a queue. It must be acked or rejected exactly once;
/// both consume the delivery. A delivery dropped without either is treated
/// by the broker as unfinished and redelivered.
pub struct Delivery {
    id: String,
    body: String,
    attempts: u8,
    settler: Arc<dyn Settle>,
}

impl Delivery {
    pub fn new(
        id: impl Into<String>,
        body: impl Into<String>,
        attempts: u8,
        settler: impl Settle + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            attempts,
            settler: Arc::new(settler),
        }
    }

    /// Broker-assigned message id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Prior deliveries of this message, as counted by the broker.
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// A handle that can hand this delivery back even after the delivery
    /// itself was moved into a task that got cancelled.
    pub fn reclaim_handle(&self) -> Reclaim {
        Reclaim {
            settler: Arc::clone(&self.settler),
        }
    }

    pub async fn ack(self) -> Result<(), MqError> {
        self.settler.settle(Settlement::Ack).await
    }

    pub async fn reject(self) -> Result<(), MqError> {
        self.settler.settle(Settlement::Reject).await
    }
}

/// See [`Delivery::reclaim_handle`].
pub struct Reclaim {
    settler: Arc<dyn Settle>,
}

impl Reclaim {
    /// Reject the delivery unless it was already acked or rejected.
    /// Returns whether this call handed it back.
    pub async fn reject_if_unsettled(self) -> Result<bool, MqError> {
        match self.settler.settle(Settlement::Reject).await {
            Ok(()) => Ok(true),
            Err(MqError::AlreadySettled) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("body", &self.body)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
