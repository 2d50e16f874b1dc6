use super::{BlockTimestamps, DispatchContext, EventDispatcher};
use crate::{
    abi::IERC20,
    database::{RelayDatabase, TransferRecord},
    error::DispatchError,
};
use alloy::{rpc::types::Log, sol_types::SolEvent};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;

pub(crate) fn decode_transfer(
    log: &Log,
    timestamp: NaiveDateTime,
) -> Result<Option<TransferRecord>, DispatchError> {
    if log.topic0() != Some(&IERC20::Transfer::SIGNATURE_HASH) || log.topics().len() != 3 {
        return Ok(None);
    }
    let event = log
        .log_decode::<IERC20::Transfer>()
        .context("failed to decode erc20 transfer")
        .map_err(DispatchError::Other)?
        .inner
        .data;
    Ok(Some(TransferRecord {
        tx_hash: log.transaction_hash.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        block_number: log.block_number.unwrap_or_default(),
        token_id: None,
        from: event.from,
        to: event.to,
        value: Some(event.value),
        timestamp,
    }))
}

/// Gold token transfers. Only the transfer history is kept.
pub struct Erc20TransferDispatcher {
    db: RelayDatabase,
}

impl Erc20TransferDispatcher {
    pub fn new(db: RelayDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventDispatcher for Erc20TransferDispatcher {
    #[tracing::instrument(skip_all, fields(contract = %ctx.contract.code, logs = logs.len()))]
    async fn parse_events(
        &self,
        logs: &[Log],
        ctx: &DispatchContext<'_>,
    ) -> Result<(), DispatchError> {
        let mut timestamps = BlockTimestamps::default();
        let mut transfers = Vec::new();
        for log in logs {
            if log.topic0() != Some(&IERC20::Transfer::SIGNATURE_HASH) {
                continue;
            }
            let timestamp = timestamps.get(ctx.provider, log).await?;
            if let Some(transfer) = decode_transfer(log, timestamp)? {
                tracing::debug!(
                    from = %transfer.from,
                    to = %transfer.to,
                    value = %transfer.value.unwrap_or_default(),
                    "registered gold transfer"
                );
                transfers.push(transfer);
            }
        }
        Ok(self
            .db
            .record_transfers(ctx.contract.id, transfers, false)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::log_at;
    use alloy::primitives::{Address, B256, U256};
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_value_from_data() {
        let event = IERC20::Transfer {
            from: Address::repeat_byte(3),
            to: Address::repeat_byte(4),
            value: U256::from(1_000_000u64),
        };
        let log = log_at(5, 1, event.encode_log_data());
        let record = decode_transfer(&log, NaiveDateTime::default())
            .unwrap()
            .unwrap();
        assert_eq!(record.value, Some(U256::from(1_000_000u64)));
        assert_eq!(record.token_id, None);
        assert_eq!(record.tx_hash, B256::repeat_byte(5));
    }
}
