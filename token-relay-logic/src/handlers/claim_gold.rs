use super::{
    Guid, HandlerContext, MessageType, Notification, RequestHandler, gold_balance_or_alert,
    lenient_u256_vec, numbers_json,
};
use crate::{abi::ITreasury, error::HandlerError, notify::events};
use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

const IDS_PER_CLAIM: usize = 10;

#[derive(Debug, Clone, Deserialize)]
struct ClaimGoldMessage {
    guid: Guid,
    address: Address,
    #[serde(deserialize_with = "lenient_u256_vec")]
    ids: Vec<U256>,
    #[serde(deserialize_with = "lenient_u256_vec")]
    classes: Vec<U256>,
}

/// Claims treasury gold for a set of cats, ten cats per call.
pub struct ClaimGoldHandler {
    message: ClaimGoldMessage,
}

impl ClaimGoldHandler {
    pub fn from_message(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            message: serde_json::from_value(body)?,
        })
    }
}

fn chunk(values: &[U256], index: usize) -> Vec<U256> {
    values
        .iter()
        .skip(index * IDS_PER_CLAIM)
        .take(IDS_PER_CLAIM)
        .copied()
        .collect()
}

#[async_trait]
impl RequestHandler for ClaimGoldHandler {
    fn message_type(&self) -> MessageType {
        MessageType::ClaimGold
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "TREASURY"
    }

    fn origin(&self) -> Address {
        self.message.address
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let message = &self.message;
        let chunks = message.ids.len().div_ceil(IDS_PER_CLAIM);
        Ok((0..chunks)
            .map(|index| {
                ITreasury::claimCall {
                    user: message.address,
                    ids: chunk(&message.ids, index),
                    classes: chunk(&message.classes, index),
                    guid: message.guid.as_bytes32(),
                }
                .abi_encode()
                .into()
            })
            .collect())
    }

    async fn success_notification(&self, ctx: &HandlerContext) -> Notification {
        let message = &self.message;
        let balance =
            gold_balance_or_alert(ctx, &message.guid, message.address, Some(message.address))
                .await;
        Notification {
            event: events::GOLD_CLAIM_TRANSACTION_SENT,
            payload: json!({
                "type": "CLAIM_GOLD",
                "messageGuid": message.guid.message_guid(),
                "account": message.address,
                "catIds": numbers_json(&message.ids),
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
                "classes": numbers_json(&message.classes),
                "guid": message.guid.to_string(),
            },
        })
    }
}
