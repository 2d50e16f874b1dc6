//! Submission of meta-transaction bundles through the relayer and resolution
//! of their outcome.

mod batcher;
mod http;
mod resolution;

pub use batcher::{BatchReport, RelayBatcher};
pub use http::HttpRelayer;
pub use resolution::{SubTransactionOutcome, parse_markers, resolve_bundle};

use crate::error::{RelayError, WaitError};
use alloy::{
    primitives::{Address, B256, Bytes},
    rpc::types::Log,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTransaction {
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: u64,
}

/// Position of a sub-transaction within the handler that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    pub handler: usize,
    pub sub_index: usize,
}

/// Ordered sub-transactions sharing one nonce. `entries[i]` produced
/// `transactions[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTransactionBundle {
    pub nonce: u64,
    pub transactions: Vec<MetaTransaction>,
    pub entries: Vec<EntryRef>,
}

/// Handle returned by the relayer for a submitted bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBundle {
    pub id: String,
    pub tx_hash: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReceipt {
    pub transaction_hash: B256,
    #[serde(default, with = "alloy::serde::quantity::opt")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

#[async_trait]
pub trait Relayer: Send + Sync {
    /// Wallet whose nonces the bundles consume.
    fn wallet(&self) -> Address;

    async fn send_bundle(&self, bundle: &MetaTransactionBundle)
    -> Result<PendingBundle, RelayError>;

    /// Waits for the bundle to be mined. An error means the outcome is unknown.
    async fn wait(&self, pending: &PendingBundle) -> Result<BundleReceipt, WaitError>;
}
