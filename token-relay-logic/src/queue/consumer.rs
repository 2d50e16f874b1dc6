use super::{ReceivedMessage, WorkQueue};
use crate::settings::QueueSettings;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{task::JoinHandle, time::sleep};

/// Handles one received batch. `Ok` means every message reached a point
/// where it must not be delivered again.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process_batch(&self, messages: &[ReceivedMessage]) -> anyhow::Result<()>;
}

pub struct QueueConsumer {
    queue: Arc<dyn WorkQueue>,
    processor: Arc<dyn MessageProcessor>,
    settings: QueueSettings,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        processor: Arc<dyn MessageProcessor>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            queue,
            processor,
            settings,
        }
    }

    /// Receives and processes a single batch. Returns the number of received
    /// messages.
    pub async fn poll_once(&self) -> anyhow::Result<usize> {
        let messages = self.queue.receive(self.settings.max_batch).await?;
        if messages.is_empty() {
            return Ok(0);
        }

        match self.processor.process_batch(&messages).await {
            Ok(()) => self.queue.ack(&messages).await?,
            Err(err) => {
                tracing::warn!(
                    err = ?err,
                    messages = messages.len(),
                    "batch failed, leaving messages for redelivery"
                );
            }
        }
        Ok(messages.len())
    }

    pub async fn run(self) {
        loop {
            match self.poll_once().await {
                Ok(0) => sleep(self.settings.poll_interval).await,
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(err = ?err, "failed to poll work queue");
                    sleep(self.settings.poll_interval).await;
                }
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
