mod erc20;
mod erc721;
mod gold_claim;
mod item_factory;
mod marketplace;
mod pet_interaction;

pub use erc20::Erc20TransferDispatcher;
pub use erc721::Erc721TransferDispatcher;
pub use gold_claim::GoldClaimDispatcher;
pub use item_factory::ItemFactoryDispatcher;
pub use marketplace::MarketplaceDispatcher;
pub use pet_interaction::PetInteractionDispatcher;
pub(crate) use gold_claim::claim_guid;

use crate::{
    contracts::{ContractDirectory, TrackedContract},
    database::RelayDatabase,
    error::DispatchError,
    notify::NotificationSink,
};
use alloy::{
    network::Ethereum,
    primitives::Address,
    providers::{DynProvider, Provider},
    rpc::types::Log,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// What a dispatcher knows about the range it is handling.
pub struct DispatchContext<'a> {
    pub contract: &'a TrackedContract,
    pub provider: &'a DynProvider<Ethereum>,
}

/// Turns raw logs of one contract into persisted state and notifications.
///
/// A range may be delivered more than once, so implementations must upsert
/// by unique keys.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn parse_events(
        &self,
        logs: &[Log],
        ctx: &DispatchContext<'_>,
    ) -> Result<(), DispatchError>;
}

/// Picks the dispatcher for a contract code. Returns `None` for contracts
/// nothing listens to.
pub fn dispatcher_for(
    contract: &TrackedContract,
    db: RelayDatabase,
    notifier: Arc<dyn NotificationSink>,
    directory: ContractDirectory,
) -> Option<Arc<dyn EventDispatcher>> {
    match contract.code.as_str() {
        "COOLCAT_721" | "COOLPET_721" => Some(Arc::new(Erc721TransferDispatcher::new(db, notifier))),
        "GOLD_CONTRACT" => Some(Arc::new(Erc20TransferDispatcher::new(db))),
        "TREASURY" | "ADVENTURERS_GUILD" => {
            Some(Arc::new(GoldClaimDispatcher::new(db, notifier, directory)))
        }
        "MARKETPLACE" => Some(Arc::new(MarketplaceDispatcher::new(db, notifier))),
        "ITEM_FACTORY" => Some(Arc::new(ItemFactoryDispatcher::new(db, notifier))),
        "PET_INTERACTION" => Some(Arc::new(PetInteractionDispatcher::new(db, notifier))),
        _ if contract.is_erc721() => Some(Arc::new(Erc721TransferDispatcher::new(db, notifier))),
        _ => None,
    }
}

/// Notification built while handling a range. Sent only after the range
/// has been persisted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Outgoing {
    pub event: String,
    pub payload: Value,
    pub address_hint: Option<Address>,
}

impl Outgoing {
    pub(crate) fn send(self, notifier: &dyn NotificationSink) {
        notifier.send(&self.event, self.payload, self.address_hint);
    }
}

/// Block timestamps for one dispatched range, fetched at most once per block.
#[derive(Default)]
pub(crate) struct BlockTimestamps {
    known: HashMap<u64, NaiveDateTime>,
}

impl BlockTimestamps {
    pub(crate) async fn get(
        &mut self,
        provider: &DynProvider<Ethereum>,
        log: &Log,
    ) -> Result<NaiveDateTime, DispatchError> {
        let block_number = log
            .block_number
            .ok_or_else(|| DispatchError::Other(anyhow!("log without block number")))?;
        if let Some(ts) = self.known.get(&block_number) {
            return Ok(*ts);
        }

        let seconds = match log.block_timestamp {
            Some(ts) => ts,
            None => {
                provider
                    .get_block_by_number(block_number.into())
                    .await?
                    .ok_or_else(|| {
                        DispatchError::Transient(anyhow!("block {block_number} is not available yet"))
                    })?
                    .header
                    .timestamp
            }
        };
        let ts = DateTime::from_timestamp(seconds as i64, 0)
            .ok_or_else(|| DispatchError::Other(anyhow!("invalid block timestamp {seconds}")))?
            .naive_utc();
        self.known.insert(block_number, ts);
        Ok(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{log_at, mock_provider, tracked_contract};
    use alloy::{primitives::LogData, transports::mock::Asserter};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn timestamps_prefer_log_field_and_cache_blocks() {
        let asserter = Asserter::new();
        let provider = mock_provider(asserter.clone());
        let mut log = log_at(10, 0, LogData::new_unchecked(vec![], Default::default()));
        log.block_timestamp = Some(1_700_000_000);

        let mut timestamps = BlockTimestamps::default();
        let first = timestamps.get(&provider, &log).await.unwrap();
        log.block_timestamp = None;
        let second = timestamps.get(&provider, &log).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.and_utc().timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn missing_block_is_transient() {
        let asserter = Asserter::new();
        asserter.push_success(&serde_json::Value::Null);
        let provider = mock_provider(asserter);
        let log = log_at(11, 0, LogData::new_unchecked(vec![], Default::default()));

        let err = BlockTimestamps::default()
            .get(&provider, &log)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn factory_picks_variant_by_code() {
        let db = crate::test_utils::lazy_database();
        let notifier: Arc<dyn NotificationSink> = Arc::new(crate::notify::NoopNotifier);
        let directory = crate::test_utils::empty_directory();
        let pick = |contract: TrackedContract| {
            dispatcher_for(&contract, db.clone(), notifier.clone(), directory.clone()).is_some()
        };

        assert!(pick(tracked_contract(1, "COOLCAT_721")));
        assert!(pick(tracked_contract(2, "GOLD_CONTRACT")));
        assert!(pick(tracked_contract(3, "TREASURY")));
        assert!(pick(tracked_contract(4, "MARKETPLACE")));
        assert!(pick(tracked_contract(6, "ITEM_FACTORY")));
        assert!(pick(tracked_contract(7, "PET_INTERACTION")));
        assert!(!pick(tracked_contract(8, "MILK_ACTION")));
        let mut custom = tracked_contract(5, "CUSTOM_NFT");
        custom.token_type = Some("erc721".to_string());
        assert!(pick(custom));
    }
}
