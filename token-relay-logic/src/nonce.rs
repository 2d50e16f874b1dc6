use crate::error::RelayError;
use alloy::{
    network::Ethereum,
    primitives::Address,
    providers::{DynProvider, Provider},
};
use async_trait::async_trait;
use std::{ops::Range, sync::Arc};
use tokio::sync::Mutex;

/// Where the first nonce of a fresh allocator comes from.
#[async_trait]
pub trait NonceSource: Send + Sync {
    async fn pending_nonce(&self, wallet: Address) -> anyhow::Result<u64>;
}

#[async_trait]
impl NonceSource for DynProvider<Ethereum> {
    async fn pending_nonce(&self, wallet: Address) -> anyhow::Result<u64> {
        Ok(self.get_transaction_count(wallet).pending().await?)
    }
}

/// Hands out consecutive nonces for one signer wallet. Reservations are
/// serialized, so concurrent batches never share or skip a nonce.
pub struct NonceAllocator {
    wallet: Address,
    source: Arc<dyn NonceSource>,
    next: Mutex<Option<u64>>,
}

impl NonceAllocator {
    pub fn new(wallet: Address, source: Arc<dyn NonceSource>) -> Self {
        Self {
            wallet,
            source,
            next: Mutex::new(None),
        }
    }

    pub fn wallet(&self) -> Address {
        self.wallet
    }

    /// Reserves `count` consecutive nonces.
    pub async fn reserve(&self, count: usize) -> Result<Range<u64>, RelayError> {
        let mut next = self.next.lock().await;
        let start = match *next {
            Some(start) => start,
            None => {
                let start = self
                    .source
                    .pending_nonce(self.wallet)
                    .await
                    .map_err(RelayError::NonceSource)?;
                tracing::info!(wallet = %self.wallet, nonce = start, "loaded pending nonce");
                start
            }
        };
        let end = start + count as u64;
        *next = Some(end);
        Ok(start..end)
    }

    /// Drops the cached value; the next reservation reloads it from the source.
    pub async fn invalidate(&self) {
        *self.next.lock().await = None;
    }
}
