pub mod delivery;
pub mod error;
pub mod memory;
pub mod redis;

use async_trait::async_trait;

pub use delivery::{Delivery, Reclaim, Settle, Settlement};
pub use error::MqError;
pub use memory::MemoryJobQueue;
pub use redis::{RedisConfig, RedisJobQueue};

/// At-least-once FIFO of opaque string messages, addressed by queue name.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn publish(&self, queue: &str, body: &str) -> Result<(), MqError>;

    /// Wait for the next message on `queue`.
    async fn consume(&self, queue: &str) -> Result<Delivery, MqError>;
}
