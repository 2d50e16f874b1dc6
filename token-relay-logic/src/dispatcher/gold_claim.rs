use super::{BlockTimestamps, DispatchContext, EventDispatcher};
use crate::{
    abi::{IAdventurersGuild, ITreasury},
    contracts::{ContractDirectory, GOLD_CONTRACT_CODE},
    database::{GoldClaimRecord, RelayDatabase},
    error::DispatchError,
    notify::{NotificationSink, event_with_address, events},
};
use alloy::{
    primitives::U256,
    rpc::types::Log,
    sol_types::SolEvent,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClaimSource {
    Treasury,
    AdventurersGuild,
}

impl ClaimSource {
    fn description(self) -> &'static str {
        match self {
            Self::Treasury => "Cool Cat owner GOLD claimed",
            Self::AdventurersGuild => "Cool pet GOLD claimed from adventurers guild",
        }
    }

    fn kind(self) -> &'static str {
        match self {
            Self::Treasury => "GOLD_CLAIMED",
            Self::AdventurersGuild => "ADVENTURE_GOLD_CLAIMED",
        }
    }

    fn event(self) -> &'static str {
        match self {
            Self::Treasury => events::GOLD_CLAIMED,
            Self::AdventurersGuild => events::ADVENTURE_GOLD_CLAIMED,
        }
    }
}

/// Claim ids are rendered as 64 hex chars, matching the stripped message guid.
pub(crate) fn claim_guid(uuid: U256) -> String {
    format!("{uuid:064x}")
}

pub(crate) fn decode_claim(
    log: &Log,
    timestamp: NaiveDateTime,
) -> Result<Option<(ClaimSource, GoldClaimRecord)>, DispatchError> {
    let (source, user, gold, uuid) = match log.topic0() {
        Some(&ITreasury::LogGoldClaimed::SIGNATURE_HASH) => {
            let event = log
                .log_decode::<ITreasury::LogGoldClaimed>()
                .context("failed to decode LogGoldClaimed")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            (ClaimSource::Treasury, event.user, event.gold, event.uuid)
        }
        Some(&IAdventurersGuild::LogAdventuringGoldClaimed::SIGNATURE_HASH) => {
            let event = log
                .log_decode::<IAdventurersGuild::LogAdventuringGoldClaimed>()
                .context("failed to decode LogAdventuringGoldClaimed")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            (ClaimSource::AdventurersGuild, event.user, event.gold, event.uuid)
        }
        _ => return Ok(None),
    };
    Ok(Some((
        source,
        GoldClaimRecord {
            guid: claim_guid(uuid),
            account: user,
            amount: gold,
            tx_hash: log.transaction_hash.unwrap_or_default(),
            block_number: log.block_number.unwrap_or_default(),
            description: source.description().to_string(),
            timestamp,
        },
    )))
}

/// Gold claims from the treasury and the adventurers guild.
pub struct GoldClaimDispatcher {
    db: RelayDatabase,
    notifier: Arc<dyn NotificationSink>,
    directory: ContractDirectory,
}

impl GoldClaimDispatcher {
    pub fn new(
        db: RelayDatabase,
        notifier: Arc<dyn NotificationSink>,
        directory: ContractDirectory,
    ) -> Self {
        Self {
            db,
            notifier,
            directory,
        }
    }

    async fn notify(&self, source: ClaimSource, claim: &GoldClaimRecord) {
        let balance = match self
            .directory
            .token_balance(GOLD_CONTRACT_CODE, claim.account)
            .await
        {
            Ok(balance) => balance.to_string(),
            Err(err) => {
                tracing::warn!(account = %claim.account, err = ?err, "failed to get gold balance");
                self.notifier.send(
                    &event_with_address(events::BLOCKCHAIN_ERROR, &claim.account),
                    json!({
                        "messageGuid": claim.guid,
                        "account": claim.account,
                        "errorMessage": "Failed to get gold balance from blockchain",
                    }),
                    Some(claim.account),
                );
                String::new()
            }
        };
        let address_hint = match source {
            ClaimSource::Treasury => Some(claim.account),
            ClaimSource::AdventurersGuild => None,
        };
        self.notifier.send(
            &event_with_address(source.event(), &claim.account),
            json!({
                "type": source.kind(),
                "messageGuid": claim.guid,
                "account": claim.account,
                "goldClaimed": claim.amount.to_string(),
                "description": claim.description,
                "goldBalance": balance,
            }),
            address_hint,
        );
    }
}

#[async_trait]
impl EventDispatcher for GoldClaimDispatcher {
    #[tracing::instrument(skip_all, fields(contract = %ctx.contract.code, logs = logs.len()))]
    async fn parse_events(
        &self,
        logs: &[Log],
        ctx: &DispatchContext<'_>,
    ) -> Result<(), DispatchError> {
        let mut timestamps = BlockTimestamps::default();
        let mut claims = Vec::new();
        for log in logs {
            let is_claim = matches!(
                log.topic0(),
                Some(&ITreasury::LogGoldClaimed::SIGNATURE_HASH)
                    | Some(&IAdventurersGuild::LogAdventuringGoldClaimed::SIGNATURE_HASH)
            );
            if !is_claim {
                continue;
            }
            let timestamp = timestamps.get(ctx.provider, log).await?;
            if let Some(claim) = decode_claim(log, timestamp)? {
                claims.push(claim);
            }
        }
        if claims.is_empty() {
            return Ok(());
        }

        let records = claims.iter().map(|(_, record)| record.clone()).collect();
        self.db.record_gold_claims(ctx.contract.id, records).await?;
        for (source, claim) in &claims {
            self.notify(*source, claim).await;
        }
        Ok(())
    }
}
