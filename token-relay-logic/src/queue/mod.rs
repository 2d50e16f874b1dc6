mod consumer;
mod memory;
mod postgres;

pub use consumer::{MessageProcessor, QueueConsumer};
pub use memory::MemoryWorkQueue;
pub use postgres::PostgresWorkQueue;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub id: Uuid,
    pub group: Option<String>,
    pub body: Value,
    pub receive_count: u32,
}

/// Durable queue with visibility-timeout redelivery. Messages that are not
/// acknowledged become visible again once their timeout passes.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn receive(&self, max: u64) -> anyhow::Result<Vec<ReceivedMessage>>;

    async fn ack(&self, messages: &[ReceivedMessage]) -> anyhow::Result<()>;

    async fn send(&self, group: Option<String>, body: Value) -> anyhow::Result<Uuid>;
}
