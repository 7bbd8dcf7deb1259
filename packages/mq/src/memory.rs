use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::delivery::{Delivery, Settle, Settlement};
use crate::error::MqError;
use crate::JobQueue;

#[derive(Debug, Clone)]
struct Message {
    id: String,
    body: String,
    attempts: u8,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: usize,
    acked: usize,
    rejected: usize,
    abandoned: usize,
}

#[derive(Default)]
struct Shared {
    queues: Mutex<HashMap<String, QueueState>>,
    published: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn requeue(&self, queue: &str, message: Message, explicit: bool) {
        {
            let mut queues = self.lock();
            let state = queues.entry(queue.to_string()).or_default();
            state.in_flight = state.in_flight.saturating_sub(1);
            if explicit {
                state.rejected += 1;
            } else {
                state.abandoned += 1;
            }
            state.ready.push_back(Message {
                attempts: message.attempts.saturating_add(1),
                ..message
            });
        }
        self.published.notify_waiters();
    }
}

/// In-process queue with the same delivery semantics as the broker:
/// rejected or abandoned deliveries go back to the tail of their queue.
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    shared: Arc<Shared>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next message without waiting.
    pub fn try_consume(&self, queue: &str) -> Option<Delivery> {
        let mut queues = self.shared.lock();
        let state = queues.get_mut(queue)?;
        let message = state.ready.pop_front()?;
        state.in_flight += 1;
        Some(Delivery::new(
            message.id.clone(),
            message.body.clone(),
            message.attempts,
            MemorySettler {
                shared: Arc::clone(&self.shared),
                queue: queue.to_string(),
                message,
                settled: AtomicBool::new(false),
            },
        ))
    }

    /// Bodies waiting on `queue`, head first.
    pub fn pending(&self, queue: &str) -> Vec<String> {
        self.shared
            .lock()
            .get(queue)
            .map(|s| s.ready.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    pub fn in_flight(&self, queue: &str) -> usize {
        self.read(queue, |s| s.in_flight)
    }

    pub fn acked(&self, queue: &str) -> usize {
        self.read(queue, |s| s.acked)
    }

    pub fn rejected(&self, queue: &str) -> usize {
        self.read(queue, |s| s.rejected)
    }

    /// Deliveries dropped without a decision and requeued by the drop.
    pub fn abandoned(&self, queue: &str) -> usize {
        self.read(queue, |s| s.abandoned)
    }

    fn read(&self, queue: &str, f: impl Fn(&QueueState) -> usize) -> usize {
        self.shared.lock().get(queue).map(f).unwrap_or(0)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn publish(&self, queue: &str, body: &str) -> Result<(), MqError> {
        self.shared
            .lock()
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(Message {
                id: Uuid::new_v4().to_string(),
                body: body.to_string(),
                attempts: 0,
            });
        self.shared.published.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Delivery, MqError> {
        loop {
            let published = self.shared.published.notified();
            if let Some(delivery) = self.try_consume(queue) {
                return Ok(delivery);
            }
            published.await;
        }
    }
}

struct MemorySettler {
    shared: Arc<Shared>,
    queue: String,
    message: Message,
    settled: AtomicBool,
}

#[async_trait]
impl Settle for MemorySettler {
    async fn settle(&self, settlement: Settlement) -> Result<(), MqError> {
        if self.settled.swap(true, Ordering::AcqRel) {
            return Err(MqError::AlreadySettled);
        }
        match settlement {
            Settlement::Ack => {
                let mut queues = self.shared.lock();
                let state = queues.entry(self.queue.clone()).or_default();
                state.in_flight = state.in_flight.saturating_sub(1);
                state.acked += 1;
            }
            Settlement::Reject => self.shared.requeue(&self.queue, self.message.clone(), true),
        }
        Ok(())
    }
}

impl Drop for MemorySettler {
    fn drop(&mut self) {
        if !self.settled.swap(true, Ordering::AcqRel) {
            self.shared.requeue(&self.queue, self.message.clone(), false);
        }
    }
}
