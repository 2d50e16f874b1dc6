use super::{BlockTimestamps, DispatchContext, EventDispatcher, Outgoing};
use crate::{
    abi::{IERC1155, IItemFactory},
    database::{ItemTransferRecord, RelayDatabase},
    error::DispatchError,
    notify::{NotificationSink, event_with_address, events},
};
use alloy::{
    primitives::{Address, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ItemFactoryEvent {
    Transfers(Vec<ItemTransferRecord>),
    BoxBought { buyer: Address, quantity: U256 },
    BoxOpened { buyer: Address, item_ids: Vec<U256> },
}

fn is_item_factory_event(log: &Log) -> bool {
    matches!(
        log.topic0(),
        Some(&IERC1155::TransferSingle::SIGNATURE_HASH)
            | Some(&IERC1155::TransferBatch::SIGNATURE_HASH)
            | Some(&IItemFactory::LogBuyBox::SIGNATURE_HASH)
            | Some(&IItemFactory::LogOpenBox::SIGNATURE_HASH)
    )
}

struct TransferParties {
    operator: Address,
    from: Address,
    to: Address,
}

fn transfer_records(
    log: &Log,
    parties: TransferParties,
    entries: impl IntoIterator<Item = (U256, U256)>,
    timestamp: NaiveDateTime,
) -> Vec<ItemTransferRecord> {
    entries
        .into_iter()
        .enumerate()
        .map(|(batch_index, (token_id, quantity))| ItemTransferRecord {
            tx_hash: log.transaction_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            batch_index: batch_index as u32,
            block_number: log.block_number.unwrap_or_default(),
            operator: parties.operator,
            from: parties.from,
            to: parties.to,
            token_id,
            quantity,
            timestamp,
        })
        .collect()
}

/// Decodes ERC-1155 transfers and box events. A batch whose id and value
/// arrays differ in length yields `None`.
pub(crate) fn decode_item_factory(
    log: &Log,
    timestamp: NaiveDateTime,
) -> Result<Option<ItemFactoryEvent>, DispatchError> {
    let event = match log.topic0() {
        Some(&IERC1155::TransferSingle::SIGNATURE_HASH) => {
            let event = log
                .log_decode::<IERC1155::TransferSingle>()
                .context("failed to decode TransferSingle")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            let parties = TransferParties {
                operator: event.operator,
                from: event.from,
                to: event.to,
            };
            ItemFactoryEvent::Transfers(transfer_records(
                log,
                parties,
                [(event.id, event.value)],
                timestamp,
            ))
        }
        Some(&IERC1155::TransferBatch::SIGNATURE_HASH) => {
            let event = log
                .log_decode::<IERC1155::TransferBatch>()
                .context("failed to decode TransferBatch")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            if event.ids.len() != event.values.len() {
                tracing::warn!(
                    tx_hash = ?log.transaction_hash,
                    ids = event.ids.len(),
                    values = event.values.len(),
                    "batch transfer with mismatched arrays, skipping"
                );
                return Ok(None);
            }
            let parties = TransferParties {
                operator: event.operator,
                from: event.from,
                to: event.to,
            };
            ItemFactoryEvent::Transfers(transfer_records(
                log,
                parties,
                event.ids.into_iter().zip(event.values),
                timestamp,
            ))
        }
        Some(&IItemFactory::LogBuyBox::SIGNATURE_HASH) => {
            let event = log
                .log_decode::<IItemFactory::LogBuyBox>()
                .context("failed to decode LogBuyBox")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            ItemFactoryEvent::BoxBought {
                buyer: event.buyer,
                quantity: event.quantity,
            }
        }
        Some(&IItemFactory::LogOpenBox::SIGNATURE_HASH) => {
            let event = log
                .log_decode::<IItemFactory::LogOpenBox>()
                .context("failed to decode LogOpenBox")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            ItemFactoryEvent::BoxOpened {
                buyer: event.buyer,
                item_ids: event.itemIds,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn box_notification(event: &ItemFactoryEvent) -> Option<Outgoing> {
    match event {
        ItemFactoryEvent::Transfers(_) => None,
        ItemFactoryEvent::BoxBought { buyer, quantity } => Some(Outgoing {
            event: event_with_address(events::BUY_BOX_MINTED, buyer),
            payload: json!({
                "type": "BUY_BOX_MINTED",
                "account": buyer,
                "quantity": quantity.to_string(),
            }),
            address_hint: Some(*buyer),
        }),
        ItemFactoryEvent::BoxOpened { buyer, item_ids } => Some(Outgoing {
            event: event_with_address(events::BOX_OPENED, buyer),
            payload: json!({
                "type": "BUY_BOX_OPENED",
                "account": buyer,
                "itemIds": item_ids.iter().map(U256::to_string).collect::<Vec<_>>(),
            }),
            address_hint: Some(*buyer),
        }),
    }
}

/// ERC-1155 item movements and box purchases of the item factory.
pub struct ItemFactoryDispatcher {
    db: RelayDatabase,
    notifier: Arc<dyn NotificationSink>,
}

impl ItemFactoryDispatcher {
    pub fn new(db: RelayDatabase, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { db, notifier }
    }
}

#[async_trait]
impl EventDispatcher for ItemFactoryDispatcher {
    #[tracing::instrument(skip_all, fields(contract = %ctx.contract.code, logs = logs.len()))]
    async fn parse_events(
        &self,
        logs: &[Log],
        ctx: &DispatchContext<'_>,
    ) -> Result<(), DispatchError> {
        let mut timestamps = BlockTimestamps::default();
        let mut transfers = Vec::new();
        let mut outgoing = Vec::new();
        for log in logs {
            if !is_item_factory_event(log) {
                continue;
            }
            let timestamp = timestamps.get(ctx.provider, log).await?;
            let Some(event) = decode_item_factory(log, timestamp)? else {
                continue;
            };
            outgoing.extend(box_notification(&event));
            if let ItemFactoryEvent::Transfers(records) = event {
                transfers.extend(records);
            }
        }

        self.db
            .record_item_transfers(ctx.contract.id, transfers)
            .await?;
        for notification in outgoing {
            notification.send(self.notifier.as_ref());
        }
        Ok(())
    }
}
