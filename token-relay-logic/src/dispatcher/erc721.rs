use super::{BlockTimestamps, DispatchContext, EventDispatcher};
use crate::{
    abi::IERC721,
    database::{RelayDatabase, TransferRecord},
    error::DispatchError,
    notify::{NotificationSink, event_with_address},
};
use alloy::{rpc::types::Log, sol_types::SolEvent};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::json;
use std::sync::Arc;

/// Decodes an ERC-721 `Transfer`. Logs with other shapes (ERC-20 transfers
/// share the topic) yield `None`.
pub(crate) fn decode_transfer(
    log: &Log,
    timestamp: NaiveDateTime,
) -> Result<Option<TransferRecord>, DispatchError> {
    if log.topic0() != Some(&IERC721::Transfer::SIGNATURE_HASH) || log.topics().len() != 4 {
        return Ok(None);
    }
    let event = log
        .log_decode::<IERC721::Transfer>()
        .context("failed to decode erc721 transfer")
        .map_err(DispatchError::Other)?
        .inner
        .data;
    Ok(Some(TransferRecord {
        tx_hash: log.transaction_hash.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        block_number: log.block_number.unwrap_or_default(),
        token_id: Some(event.tokenId),
        from: event.from,
        to: event.to,
        value: None,
        timestamp,
    }))
}

pub struct Erc721TransferDispatcher {
    db: RelayDatabase,
    notifier: Arc<dyn NotificationSink>,
}

impl Erc721TransferDispatcher {
    pub fn new(db: RelayDatabase, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { db, notifier }
    }

    fn notify(&self, code: &str, transfer: &TransferRecord) {
        let token_id = transfer.token_id.unwrap_or_default().to_string();
        for (suffix, account) in [("FROM", transfer.from), ("TO", transfer.to)] {
            let kind = format!("{code}_TRANSFER_{suffix}");
            self.notifier.send(
                &event_with_address(&kind, &account),
                json!({"type": kind, "account": account, "tokenId": token_id}),
                None,
            );
        }
    }
}

#[async_trait]
impl EventDispatcher for Erc721TransferDispatcher {
    #[tracing::instrument(skip_all, fields(contract = %ctx.contract.code, logs = logs.len()))]
    async fn parse_events(
        &self,
        logs: &[Log],
        ctx: &DispatchContext<'_>,
    ) -> Result<(), DispatchError> {
        let mut timestamps = BlockTimestamps::default();
        let mut transfers = Vec::new();
        for log in logs {
            if log.topic0() != Some(&IERC721::Transfer::SIGNATURE_HASH) {
                continue;
            }
            let timestamp = timestamps.get(ctx.provider, log).await?;
            match decode_transfer(log, timestamp)? {
                Some(transfer) => transfers.push(transfer),
                None => tracing::warn!(
                    tx_hash = ?log.transaction_hash,
                    "transfer log is not an erc721 transfer, skipping"
                ),
            }
        }
        if transfers.is_empty() {
            return Ok(());
        }

        self.db
            .record_transfers(ctx.contract.id, transfers.clone(), true)
            .await?;
        for transfer in &transfers {
            self.notify(&ctx.contract.code, transfer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingNotifier, log_at};
    use alloy::primitives::{Address, U256};
    use pretty_assertions::assert_eq;

    fn transfer_log(token_id: u64) -> Log {
        let event = IERC721::Transfer {
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            tokenId: U256::from(token_id),
        };
        log_at(20, 3, event.encode_log_data())
    }

    #[test]
    fn decodes_indexed_token_id() {
        let record = decode_transfer(&transfer_log(77), NaiveDateTime::default())
            .unwrap()
            .unwrap();
        assert_eq!(record.token_id, Some(U256::from(77)));
        assert_eq!(record.to, Address::repeat_byte(2));
        assert_eq!(record.block_number, 20);
        assert_eq!(record.log_index, 3);
    }

    #[test]
    fn ignores_erc20_shaped_transfer() {
        let event = crate::abi::IERC20::Transfer {
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            value: U256::from(5),
        };
        let log = log_at(20, 0, event.encode_log_data());
        assert_eq!(decode_transfer(&log, NaiveDateTime::default()).unwrap(), None);
    }

    #[test]
    fn notifies_both_sides() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher =
            Erc721TransferDispatcher::new(crate::test_utils::lazy_database(), notifier.clone());
        let record = decode_transfer(&transfer_log(9), NaiveDateTime::default())
            .unwrap()
            .unwrap();
        dispatcher.notify("COOLCAT_721", &record);

        let sent = notifier.events();
        assert_eq!(
            sent,
            vec![
                "COOLCAT_721_TRANSFER_FROM-0101010101".to_string(),
                "COOLCAT_721_TRANSFER_TO-0202020202".to_string(),
            ]
        );
        assert_eq!(notifier.payloads()[1]["tokenId"], "9");
    }
}
