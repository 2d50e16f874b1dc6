use super::{
    Guid, HandlerContext, MessageType, Notification, RequestHandler, gold_balance_or_alert,
    lenient_u256_vec, numbers_json,
};
use crate::{
    abi::IAdventurersGuild,
    error::HandlerError,
    notify::{event_with_address, events},
};
use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Deserialize)]
struct AdventureClaimMessage {
    guid: Guid,
    address: Address,
    #[serde(deserialize_with = "lenient_u256_vec")]
    ids: Vec<U256>,
}

/// Claims gold earned by pets on adventures. Refuses to claim a guid that
/// already has a recorded gold transaction.
pub struct ClaimAdventureGoldHandler {
    message: AdventureClaimMessage,
}

impl ClaimAdventureGoldHandler {
    pub fn from_message(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            message: serde_json::from_value(body)?,
        })
    }

    fn report_database_error(&self, ctx: &HandlerContext, error_message: &str) {
        ctx.notifier.send(
            &event_with_address(events::DATABASE_ERROR, &self.message.address),
            json!({
                "messageGuid": self.message.guid.message_guid(),
                "account": self.message.address,
                "errorMessage": error_message,
            }),
            None,
        );
    }
}

#[async_trait]
impl RequestHandler for ClaimAdventureGoldHandler {
    fn message_type(&self) -> MessageType {
        MessageType::ClaimAdventureGold
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "ADVENTURERS_GUILD"
    }

    fn origin(&self) -> Address {
        self.message.address
    }

    fn address_hint(&self) -> Option<Address> {
        None
    }

    async fn precheck(&self, ctx: &HandlerContext) -> Result<(), HandlerError> {
        let key = self.message.guid.claim_key();
        match ctx.ledger.gold_transaction_exists(&key).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                let err = HandlerError::AlreadyProcessed {
                    guid: self.message.guid.message_guid().to_string(),
                };
                self.report_database_error(ctx, &err.to_string());
                Err(err)
            }
            Err(err) => {
                tracing::error!(guid = %key, err = ?err, "failed to check gold transactions");
                self.report_database_error(ctx, "gold transactions could not be accessed");
                Err(HandlerError::Contract(err))
            }
        }
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let call = IAdventurersGuild::claimCall {
            user: self.message.address,
            ids: self.message.ids.clone(),
            guid: self.message.guid.as_bytes32(),
        };
        Ok(vec![call.abi_encode().into()])
    }

    async fn success_notification(&self, ctx: &HandlerContext) -> Notification {
        let message = &self.message;
        let balance = gold_balance_or_alert(ctx, &message.guid, message.address, None).await;
        Notification {
            event: events::ADVENTURE_GOLD_CLAIM_TRANSACTION_SENT,
            payload: json!({
                "type": "ADVENTURE_GOLD_CLAIM_TRANSACTION_SENT",
                "messageGuid": message.guid.message_guid(),
                "account": message.address,
                "tokenIds": numbers_json(&message.ids),
                "goldBalance": balance,
            }),
        }
    }

    fn failure_message(&self) -> Value {
        let message = &self.message;
        json!({
            "type": "CLAIM_GOLD",
            "messageGuid": message.guid.message_guid(),
            "account": message.address,
            "params": {
                "address": message.address,
                "ids": numbers_json(&message.ids),
                "guid": message.guid.to_string(),
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StakeMessage {
    guid: Guid,
    user: Address,
    #[serde(deserialize_with = "lenient_u256_vec")]
    tokens_ids: Vec<U256>,
}

/// Stakes pets into the guild, or takes them back out.
pub struct StakeHandler {
    stake: bool,
    message: StakeMessage,
}

impl StakeHandler {
    pub fn stake(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            stake: true,
            message: serde_json::from_value(body)?,
        })
    }

    pub fn unstake(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            stake: false,
            message: serde_json::from_value(body)?,
        })
    }
}

#[async_trait]
impl RequestHandler for StakeHandler {
    fn message_type(&self) -> MessageType {
        if self.stake {
            MessageType::StakePet
        } else {
            MessageType::UnStakePet
        }
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "ADVENTURERS_GUILD"
    }

    fn origin(&self) -> Address {
        self.message.user
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let user = self.message.user;
        let token_ids = self.message.tokens_ids.clone();
        let data = if self.stake {
            IAdventurersGuild::stakeCall {
                user,
                tokenIds: token_ids,
            }
            .abi_encode()
        } else {
            IAdventurersGuild::unStakeCall {
                user,
                tokenIds: token_ids,
                guid: self.message.guid.as_bytes32(),
            }
            .abi_encode()
        };
        Ok(vec![data.into()])
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        let (event, kind) = if self.stake {
            (events::STAKE_PET_TRANSACTION_SENT, "STAKE_PET_TRANSACTION_SENT")
        } else {
            (events::UN_STAKE_PET_TRANSACTION_SENT, "UN_STAKE_PET_TRANSACTION_SENT")
        };
        Notification {
            event,
            payload: json!({
                "type": kind,
                "messageGuid": self.message.guid.message_guid(),
                "user": self.message.user,
                "tokensIds": numbers_json(&self.message.tokens_ids),
            }),
        }
    }

    fn failure_message(&self) -> Value {
        json!({
            "type": self.message_type().to_string(),
            "messageGuid": self.message.guid.message_guid(),
            "account": self.message.user,
            "params": {
                "user": self.message.user,
                "tokensIds": numbers_json(&self.message.tokens_ids),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatcher::claim_guid,
        test_utils::{StaticLedger, handler_context},
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const USER: &str = "0x0a1b2c3d4e5f60718293a4b5c6d7e8f901234567";

    fn claim(guid: &str) -> ClaimAdventureGoldHandler {
        ClaimAdventureGoldHandler::from_message(json!({
            "type": "CLAIM_ADVENTURE_GOLD",
            "guid": guid,
            "address": USER,
            "ids": [3, 4],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn refuses_recorded_claims() {
        let (mut ctx, notifier) = handler_context(vec![], None);
        let recorded = claim_guid(U256::from(0xabc));
        ctx.ledger = Arc::new(StaticLedger::new([recorded.as_str()]));

        let err = claim("0xabc").precheck(&ctx).await.unwrap_err();
        assert!(matches!(err, HandlerError::AlreadyProcessed { .. }));
        assert_eq!(notifier.events(), vec!["database-error-0A1B2C3D4E".to_string()]);
        assert_eq!(
            notifier.payloads()[0]["errorMessage"],
            "transaction has already been processed abc"
        );

        let padded = format!("0x{}", recorded.to_uppercase());
        for guid in ["0x0ABC", padded.as_str()] {
            assert!(
                matches!(claim(guid).precheck(&ctx).await, Err(HandlerError::AlreadyProcessed { .. })),
                "{guid}"
            );
        }
        assert!(claim("0xabd").precheck(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn ledger_errors_block_the_claim() {
        let (mut ctx, notifier) = handler_context(vec![], None);
        ctx.ledger = Arc::new(StaticLedger::failing());

        let err = claim("0x01").precheck(&ctx).await.unwrap_err();
        assert!(matches!(err, HandlerError::Contract(_)));
        assert_eq!(notifier.events().len(), 1);
    }

    #[test]
    fn unstake_passes_guid() {
        let body = json!({
            "type": "UN_STAKE_PET",
            "guid": "0x0a",
            "user": USER,
            "tokensIds": ["5", 6],
        });
        let handler = StakeHandler::unstake(body.clone()).unwrap();
        let call =
            IAdventurersGuild::unStakeCall::abi_decode(&handler.calldata().unwrap()[0]).unwrap();
        assert_eq!(call.tokenIds, vec![U256::from(5), U256::from(6)]);
        assert_eq!(call.guid, handler.guid().as_bytes32());
        assert_eq!(handler.failure_message()["type"], "UN_STAKE_PET");

        let stake = StakeHandler::stake(body).unwrap();
        assert!(IAdventurersGuild::stakeCall::abi_decode(&stake.calldata().unwrap()[0]).is_ok());
    }
}
