use async_trait::async_trait;

/// Persisted `contract_id -> next_block` mapping advanced by scanners.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn save_cursor(&self, contract_id: i32, next_block: u64) -> anyhow::Result<()>;

    /// Re-establishes connectivity after a transient failure.
    async fn reconnect(&self) -> anyhow::Result<()>;
}
