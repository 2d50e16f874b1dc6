use super::{ReceivedMessage, WorkQueue};
use async_trait::async_trait;
use serde_json::Value;
use std::{collections::VecDeque, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use uuid::Uuid;

struct Entry {
    message: ReceivedMessage,
    visible_at: Instant,
}

/// In-process queue with the same visibility semantics as the database one.
pub struct MemoryWorkQueue {
    entries: Mutex<VecDeque<Entry>>,
    visibility_timeout: Duration,
}

impl MemoryWorkQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            visibility_timeout,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn receive(&self, max: u64) -> anyhow::Result<Vec<ReceivedMessage>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let received = entries
            .iter_mut()
            .filter(|entry| entry.visible_at <= now)
            .take(max as usize)
            .map(|entry| {
                entry.visible_at = now + self.visibility_timeout;
                entry.message.receive_count += 1;
                entry.message.clone()
            })
            .collect();
        Ok(received)
    }

    async fn ack(&self, messages: &[ReceivedMessage]) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        entries.retain(|entry| !messages.iter().any(|m| m.id == entry.message.id));
        Ok(())
    }

    async fn send(&self, group: Option<String>, body: Value) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.entries.lock().await.push_back(Entry {
            message: ReceivedMessage {
                id,
                group,
                body,
                receive_count: 0,
            },
            visible_at: Instant::now(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn receives_in_order_up_to_max() {
        let queue = MemoryWorkQueue::new(Duration::from_secs(30));
        let first = queue.send(None, json!({"n": 1})).await.unwrap();
        queue.send(None, json!({"n": 2})).await.unwrap();
        queue.send(None, json!({"n": 3})).await.unwrap();

        let batch = queue.receive(2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, first);
        assert_eq!(batch[0].receive_count, 1);

        let rest = queue.receive(10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].body, json!({"n": 3}));
    }

    #[tokio::test]
    async fn unacknowledged_messages_come_back_after_timeout() {
        let queue = MemoryWorkQueue::new(Duration::from_millis(50));
        queue.send(Some("g".to_string()), json!({})).await.unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert!(queue.receive(10).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        let again = queue.receive(10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].receive_count, 2);

        queue.ack(&batch).await.unwrap();
        assert!(queue.is_empty().await);
    }
}
