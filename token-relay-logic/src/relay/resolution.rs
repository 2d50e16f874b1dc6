use super::{BundleReceipt, MetaTransactionBundle};
use crate::{abi::IRelayWallet, error::WaitError, revert::parse_reason_data};
use alloy::{rpc::types::Log, sol_types::SolEvent};

pub const OUT_OF_GAS_BUNDLE: &str = "Unable to complete transaction: Out of Gas. Please try again";
pub const OUT_OF_GAS_TRANSACTION: &str = "Transaction ran out of gas. Please try again";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubTransactionOutcome {
    Executed,
    Failed(String),
}

impl SubTransactionOutcome {
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Executed => None,
            Self::Failed(reason) => Some(reason),
        }
    }
}

fn failure_reason(log: &Log) -> String {
    let reason = log
        .log_decode::<IRelayWallet::TxFailed>()
        .ok()
        .and_then(|decoded| parse_reason_data(&decoded.inner.data._reason))
        .unwrap_or_default();
    if reason.is_empty() {
        OUT_OF_GAS_TRANSACTION.to_string()
    } else {
        reason
    }
}

/// Outcome markers in log order. The wallet emits a log without topics for
/// every executed sub-transaction and `TxFailed` for every failed one; all
/// other logs are ignored.
pub fn parse_markers(logs: &[Log]) -> Vec<SubTransactionOutcome> {
    logs.iter()
        .filter_map(|log| {
            let topics = log.topics();
            if topics.is_empty() {
                Some(SubTransactionOutcome::Executed)
            } else if topics.contains(&IRelayWallet::TxFailed::SIGNATURE_HASH) {
                Some(SubTransactionOutcome::Failed(failure_reason(log)))
            } else {
                None
            }
        })
        .collect()
}

/// Outcome of every sub-transaction of `bundle`, in bundle order. Anything
/// that cannot be proven executed is reported as failed.
pub fn resolve_bundle(
    bundle: &MetaTransactionBundle,
    result: Result<BundleReceipt, WaitError>,
) -> Vec<SubTransactionOutcome> {
    let count = bundle.transactions.len();
    let receipt = match result {
        Ok(receipt) => receipt,
        Err(WaitError {
            receipt: Some(receipt),
            message,
        }) => {
            tracing::warn!(
                nonce = bundle.nonce,
                wait_error = %message,
                "bundle wait failed, using attached receipt"
            );
            receipt
        }
        Err(err) => {
            tracing::warn!(nonce = bundle.nonce, err = %err, "bundle outcome is unknown");
            return vec![SubTransactionOutcome::Failed(err.message); count];
        }
    };

    let markers = parse_markers(&receipt.logs);
    if markers.is_empty() {
        tracing::warn!(
            nonce = bundle.nonce,
            tx_hash = %receipt.transaction_hash,
            "receipt has no outcome markers"
        );
        return vec![SubTransactionOutcome::Failed(OUT_OF_GAS_BUNDLE.to_string()); count];
    }
    if markers.len() != count {
        tracing::warn!(
            nonce = bundle.nonce,
            tx_hash = %receipt.transaction_hash,
            markers = markers.len(),
            transactions = count,
            "MISMATCH between outcome markers and sub-transactions"
        );
    }
    (0..count)
        .map(|index| {
            markers
                .get(index)
                .cloned()
                .unwrap_or_else(|| SubTransactionOutcome::Failed(OUT_OF_GAS_BUNDLE.to_string()))
        })
        .collect()
}
