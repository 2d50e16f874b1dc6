use crate::settings::Settings;
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::Context;
use std::sync::Arc;
use tokio::task::JoinHandle;
use token_relay_logic::{
    HandlerContext, HttpRelayer, NonceAllocator, PostgresWorkQueue, QueueConsumer, RelayBatcher,
    RelayDatabase, Relayer,
};

/// Starts the configured number of queue consumers sharing one batcher and
/// one nonce allocator.
pub fn start(
    settings: &Settings,
    db: RelayDatabase,
    ctx: HandlerContext,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let relay = settings
        .relay
        .as_ref()
        .context("relay settings are missing")?;
    let provider = ProviderBuilder::new()
        .connect_http(relay.rpc_url.parse().context("invalid relay rpc url")?)
        .erased();
    let relayer = Arc::new(HttpRelayer::new(relay)?);
    let nonces = Arc::new(NonceAllocator::new(
        relayer.wallet(),
        Arc::new(provider.clone()),
    ));
    let batcher = Arc::new(RelayBatcher::new(relayer, nonces, ctx, provider));
    let queue = Arc::new(PostgresWorkQueue::new(db, settings.queue.visibility_timeout));

    let handles: Vec<_> = (0..settings.queue.workers)
        .map(|_| QueueConsumer::new(queue.clone(), batcher.clone(), settings.queue.clone()).spawn())
        .collect();
    tracing::info!(
        workers = handles.len(),
        wallet = %relay.wallet,
        max_batch = settings.queue.max_batch,
        "queue consumers started"
    );
    Ok(handles)
}
