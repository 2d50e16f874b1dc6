use super::{ReceivedMessage, WorkQueue};
use crate::database::RelayDatabase;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use token_relay_entity::work_messages;
use uuid::Uuid;

pub struct PostgresWorkQueue {
    db: RelayDatabase,
    visibility_timeout: Duration,
}

impl PostgresWorkQueue {
    pub fn new(db: RelayDatabase, visibility_timeout: Duration) -> Self {
        Self {
            db,
            visibility_timeout,
        }
    }
}

impl From<work_messages::Model> for ReceivedMessage {
    fn from(model: work_messages::Model) -> Self {
        Self {
            id: model.id,
            group: model.message_group,
            body: model.body,
            receive_count: model.receive_count.max(0) as u32,
        }
    }
}

#[async_trait]
impl WorkQueue for PostgresWorkQueue {
    async fn receive(&self, max: u64) -> anyhow::Result<Vec<ReceivedMessage>> {
        let messages = self
            .db
            .receive_messages(max, self.visibility_timeout)
            .await?;
        Ok(messages.into_iter().map(ReceivedMessage::from).collect())
    }

    async fn ack(&self, messages: &[ReceivedMessage]) -> anyhow::Result<()> {
        let ids = messages.iter().map(|m| m.id).collect();
        Ok(self.db.delete_messages(ids).await?)
    }

    async fn send(&self, group: Option<String>, body: Value) -> anyhow::Result<Uuid> {
        Ok(self.db.enqueue_message(group, body).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_db;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn acknowledged_messages_are_not_redelivered() {
        let guard = init_db("postgres_work_queue_ack").await;
        let queue = PostgresWorkQueue::new(RelayDatabase::new(guard.client()), Duration::ZERO);
        queue
            .send(None, serde_json::json!({"type": "BUY_BOX", "guid": "0x01"}))
            .await
            .unwrap();

        let batch = queue.receive(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body["type"], "BUY_BOX");
        queue.ack(&batch).await.unwrap();
        assert!(queue.receive(10).await.unwrap().is_empty());
    }
}
