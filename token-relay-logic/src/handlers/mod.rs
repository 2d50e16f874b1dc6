//! Request handlers turn one work message into relayable calldata and own
//! the client-facing callbacks for that message.

mod adventurers_guild;
mod buy_action;
mod buy_box;
mod claim_gold;
mod marketplace;
mod open_box;
mod pet_interaction;
mod quest;
mod user_connection;

pub use adventurers_guild::{ClaimAdventureGoldHandler, StakeHandler};
pub use buy_action::BuyActionHandler;
pub use buy_box::BuyBoxHandler;
pub use claim_gold::ClaimGoldHandler;
pub use marketplace::MarketplaceHandler;
pub use open_box::OpenBoxHandler;
pub use pet_interaction::PetInteractionHandler;
pub use quest::{CompleteQuestHandler, RollUserQuestHandler};
pub use user_connection::UserConnectionHandler;

use crate::{
    contracts::{ContractDirectory, GOLD_CONTRACT_CODE},
    dispatcher::claim_guid,
    error::HandlerError,
    notify::{NotificationSink, event_with_address, events},
    relay::MetaTransaction,
};
use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Deserializer, de};
use serde_json::{Value, json};
use std::{fmt, str::FromStr, sync::Arc};

pub const DEFAULT_MAX_GROUPING: usize = 10;
const DEFAULT_ENTROPY_MULTIPLIER: u64 = 100_000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::EnumString, strum_macros::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    ClaimGold,
    ConnectUser,
    DisconnectUser,
    BuyBox,
    BuyAction,
    OpenBox,
    PetInteraction,
    CreateListing,
    RemoveListing,
    BuyListing,
    RollUserQuest,
    CompleteQuest,
    ClaimAdventureGold,
    StakePet,
    UnStakePet,
}

/// Message identity. A `0x`-prefixed hex string that also serves as the
/// on-chain `bytes32` guid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Guid {
    raw: String,
    value: B256,
}

impl Guid {
    pub fn as_bytes32(&self) -> B256 {
        self.value
    }

    /// Key under which a mined claim with this guid is recorded.
    pub fn claim_key(&self) -> String {
        claim_guid(U256::from_be_bytes(self.value.0))
    }

    /// The guid without its `0x` prefix, as clients know it.
    pub fn message_guid(&self) -> &str {
        self.raw.strip_prefix("0x").unwrap_or(&self.raw)
    }
}

impl TryFrom<String> for Guid {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let digits = raw.strip_prefix("0x").unwrap_or(&raw);
        if digits.is_empty() {
            return Err("guid is empty".to_string());
        }
        let value = U256::from_str_radix(digits, 16)
            .map_err(|err| format!("guid {raw} is not a 32 byte hex value: {err}"))?;
        Ok(Self {
            value: B256::from(value),
            raw,
        })
    }
}

impl FromStr for Guid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Accepts integers sent either as JSON numbers or as decimal/hex strings.
pub(crate) fn lenient_u256<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(text) => U256::from_str(text.trim()).map_err(de::Error::custom),
        Value::Number(number) => number
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| de::Error::custom(format!("{number} is not an unsigned integer"))),
        other => Err(de::Error::custom(format!("expected an integer, got {other}"))),
    }
}

pub(crate) fn lenient_u256_vec<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<U256>, D::Error> {
    #[derive(Deserialize)]
    struct Item(#[serde(deserialize_with = "lenient_u256")] U256);

    let items = Vec::<Item>::deserialize(deserializer)?;
    Ok(items.into_iter().map(|Item(value)| value).collect())
}

/// Integers that fit into `u64` are echoed back to clients as JSON numbers.
pub(crate) fn number_json(value: &U256) -> Value {
    u64::try_from(*value)
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(value.to_string()))
}

pub(crate) fn numbers_json(values: &[U256]) -> Value {
    Value::Array(values.iter().map(number_json).collect())
}

/// Gold balance of `account` as a decimal string. On failure the client is
/// told and an empty balance is reported.
pub(crate) async fn gold_balance_or_alert(
    ctx: &HandlerContext,
    guid: &Guid,
    account: Address,
    address_hint: Option<Address>,
) -> String {
    match ctx.directory.token_balance(GOLD_CONTRACT_CODE, account).await {
        Ok(balance) => balance.to_string(),
        Err(err) => {
            tracing::warn!(account = %account, err = ?err, "failed to get gold balance");
            ctx.notifier.send(
                &event_with_address(events::BLOCKCHAIN_ERROR, &account),
                json!({
                    "messageGuid": guid.message_guid(),
                    "account": account,
                    "errorMessage": "Failed to get gold balance from blockchain",
                }),
                address_hint,
            );
            String::new()
        }
    }
}

/// Random value below `multiplier`, fixed for the lifetime of a handler.
pub(crate) fn generate_entropy(multiplier: u64) -> U256 {
    U256::from(rand::rng().random_range(0..multiplier))
}

pub(crate) fn default_entropy() -> U256 {
    generate_entropy(DEFAULT_ENTROPY_MULTIPLIER)
}

/// Source of truth for gold claims that already landed on chain.
#[async_trait]
pub trait GoldLedger: Send + Sync {
    async fn gold_transaction_exists(&self, guid: &str) -> anyhow::Result<bool>;
}

/// Dependencies shared by all handlers of a pipeline.
#[derive(Clone)]
pub struct HandlerContext {
    pub notifier: Arc<dyn NotificationSink>,
    pub ledger: Arc<dyn GoldLedger>,
    pub directory: ContractDirectory,
}

/// Event name and payload published to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub event: &'static str,
    pub payload: Value,
}

/// A failed handler: the text clients see plus the best recovered revert reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub message: String,
    pub reason: String,
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    fn message_type(&self) -> MessageType;

    fn guid(&self) -> &Guid;

    /// Code of the contract every calldata entry is sent to.
    fn contract_code(&self) -> &'static str;

    /// The user the message acts for.
    fn origin(&self) -> Address;

    /// Upper bound on sub-transactions per bundle when this handler leads a batch.
    fn max_grouping(&self) -> usize {
        DEFAULT_MAX_GROUPING
    }

    /// Gas limit per calldata entry. Zero leaves estimation to the relayer.
    fn gas_limit(&self) -> u64 {
        0
    }

    /// Runs before any calldata is built.
    async fn precheck(&self, _ctx: &HandlerContext) -> Result<(), HandlerError> {
        Ok(())
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError>;

    fn transactions(&self, to: Address) -> Result<Vec<MetaTransaction>, HandlerError> {
        let gas_limit = self.gas_limit();
        Ok(self
            .calldata()?
            .into_iter()
            .map(|data| MetaTransaction {
                to,
                data,
                gas_limit,
            })
            .collect())
    }

    async fn success_notification(&self, ctx: &HandlerContext) -> Notification;

    fn failure_message(&self) -> Value;

    /// Channel hint for notifications. `None` publishes on the shared channel.
    fn address_hint(&self) -> Option<Address> {
        Some(self.origin())
    }

    /// The bundle carrying this handler was accepted by the relayer.
    async fn on_sent(&self, _ctx: &HandlerContext) {
        tracing::debug!(
            message_type = %self.message_type(),
            guid = %self.guid(),
            "transaction sent"
        );
    }

    async fn on_success(&self, ctx: &HandlerContext) {
        let Notification { event, payload } = self.success_notification(ctx).await;
        ctx.notifier.send(
            &event_with_address(event, &self.origin()),
            payload,
            self.address_hint(),
        );
    }

    async fn on_failure(&self, ctx: &HandlerContext, failure: &FailureReport) {
        let mut payload = self.failure_message();
        if let Value::Object(map) = &mut payload {
            map.insert("errorMessage".to_string(), json!(failure.message));
            map.insert("reason".to_string(), json!(failure.reason));
        }
        tracing::warn!(
            message_type = %self.message_type(),
            guid = %self.guid(),
            message = %failure.message,
            reason = %failure.reason,
            "transaction failed"
        );
        ctx.notifier.send(
            &event_with_address(events::BLOCKCHAIN_ERROR, &self.origin()),
            payload,
            self.address_hint(),
        );
    }
}

/// Builds the handler for a message body. Unknown or missing types yield
/// `Ok(None)` and are dropped by the caller.
pub fn route(body: &Value) -> Result<Option<Box<dyn RequestHandler>>, HandlerError> {
    let Some(message_type) = body
        .get("type")
        .and_then(Value::as_str)
        .and_then(|t| MessageType::from_str(t).ok())
    else {
        return Ok(None);
    };
    let body = body.clone();
    let handler: Box<dyn RequestHandler> = match message_type {
        MessageType::ClaimGold => Box::new(ClaimGoldHandler::from_message(body)?),
        MessageType::ConnectUser => Box::new(UserConnectionHandler::connect(body)?),
        MessageType::DisconnectUser => Box::new(UserConnectionHandler::disconnect(body)?),
        MessageType::BuyBox => Box::new(BuyBoxHandler::from_message(body)?),
        MessageType::BuyAction => Box::new(BuyActionHandler::from_message(body)?),
        MessageType::OpenBox => Box::new(OpenBoxHandler::from_message(body)?),
        MessageType::PetInteraction => Box::new(PetInteractionHandler::from_message(body)?),
        MessageType::CreateListing | MessageType::RemoveListing | MessageType::BuyListing => {
            Box::new(MarketplaceHandler::from_message(message_type, body)?)
        }
        MessageType::RollUserQuest => Box::new(RollUserQuestHandler::from_message(body)?),
        MessageType::CompleteQuest => Box::new(CompleteQuestHandler::from_message(body)?),
        MessageType::ClaimAdventureGold => {
            Box::new(ClaimAdventureGoldHandler::from_message(body)?)
        }
        MessageType::StakePet => Box::new(StakeHandler::stake(body)?),
        MessageType::UnStakePet => Box::new(StakeHandler::unstake(body)?),
    };
    Ok(Some(handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("CLAIM_GOLD", MessageType::ClaimGold)]
    #[case("UN_STAKE_PET", MessageType::UnStakePet)]
    #[case("CLAIM_ADVENTURE_GOLD", MessageType::ClaimAdventureGold)]
    #[case("PET_INTERACTION", MessageType::PetInteraction)]
    fn parses_message_types(#[case] raw: &str, #[case] expected: MessageType) {
        assert_eq!(MessageType::from_str(raw).unwrap(), expected);
        assert_eq!(expected.to_string(), raw);
    }

    #[test]
    fn guid_keeps_client_form_and_pads_bytes() {
        let guid: Guid = "0xabc".parse().unwrap();
        assert_eq!(guid.message_guid(), "abc");
        assert_eq!(guid.to_string(), "0xabc");
        assert_eq!(guid.as_bytes32(), B256::from(U256::from(0xabc)));
        assert!("0x".parse::<Guid>().is_err());
        assert!("0xnothex".parse::<Guid>().is_err());
    }

    #[rstest]
    #[case(json!({"type": "SELL_CAT", "guid": "0x01"}))]
    #[case(json!({"guid": "0x01"}))]
    #[case(json!({"type": 7}))]
    fn unknown_types_are_not_routed(#[case] body: Value) {
        assert!(route(&body).unwrap().is_none());
    }

    #[test]
    fn bad_payload_is_an_error() {
        let body = json!({"type": "BUY_BOX", "guid": "0x01", "address": "nope", "quantity": 1});
        assert!(matches!(
            route(&body),
            Err(HandlerError::InvalidPayload(_))
        ));
    }

    #[test]
    fn routes_known_types() {
        let body = json!({
            "type": "BUY_BOX",
            "guid": "0x01",
            "address": "0x0a1b2c3d4e5f60718293a4b5c6d7e8f901234567",
            "quantity": "3",
        });
        let handler = route(&body).unwrap().unwrap();
        assert_eq!(handler.message_type(), MessageType::BuyBox);
        assert_eq!(handler.contract_code(), "ITEM_FACTORY");
        assert_eq!(handler.calldata().unwrap().len(), 1);
    }

    #[test]
    fn lenient_numbers_accept_strings_and_numbers() {
        #[derive(Deserialize)]
        struct Amounts {
            #[serde(deserialize_with = "lenient_u256")]
            one: U256,
            #[serde(deserialize_with = "lenient_u256_vec")]
            many: Vec<U256>,
        }
        let amounts: Amounts =
            serde_json::from_value(json!({"one": "0x10", "many": [1, "2", " 3 "]})).unwrap();
        assert_eq!(amounts.one, U256::from(16));
        assert_eq!(amounts.many, vec![U256::from(1), U256::from(2), U256::from(3)]);
        assert!(serde_json::from_value::<Amounts>(json!({"one": -1, "many": []})).is_err());
    }

    #[test]
    fn entropy_stays_below_multiplier() {
        for _ in 0..100 {
            assert!(generate_entropy(10) < U256::from(10));
        }
    }
}
