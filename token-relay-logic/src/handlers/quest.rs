use super::{
    Guid, HandlerContext, MessageType, Notification, RequestHandler, default_entropy,
    lenient_u256, lenient_u256_vec, number_json, numbers_json,
};
use crate::{abi::IQuest, error::HandlerError, notify::events};
use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

const ROLL_GAS_LIMIT: u64 = 150_000;
const COMPLETE_GAS_LIMIT: u64 = 444_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollUserQuestMessage {
    guid: Guid,
    user: Address,
    #[serde(default)]
    re_roll: bool,
}

pub struct RollUserQuestHandler {
    message: RollUserQuestMessage,
    entropy: U256,
}

impl RollUserQuestHandler {
    pub fn from_message(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            message: serde_json::from_value(body)?,
            entropy: default_entropy(),
        })
    }
}

#[async_trait]
impl RequestHandler for RollUserQuestHandler {
    fn message_type(&self) -> MessageType {
        MessageType::RollUserQuest
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "QUEST"
    }

    fn origin(&self) -> Address {
        self.message.user
    }

    fn gas_limit(&self) -> u64 {
        ROLL_GAS_LIMIT
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let call = IQuest::rollUserQuestsCall {
            user: self.message.user,
            reRoll: self.message.re_roll,
            entropy: self.entropy,
        };
        Ok(vec![call.abi_encode().into()])
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        Notification {
            event: events::ROLL_USER_QUEST_TRANSACTION_SENT,
            payload: json!({
                "type": "ROLL_USER_QUEST_TRANSACTION_SENT",
                "messageGuid": self.message.guid.message_guid(),
                "user": self.message.user,
                "reRoll": self.message.re_roll,
            }),
        }
    }

    fn failure_message(&self) -> Value {
        json!({
            "type": "ROLL_USER_QUEST",
            "messageGuid": self.message.guid.message_guid(),
            "account": self.message.user,
            "params": {
                "user": self.message.user,
                "reRoll": self.message.re_roll,
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteQuestMessage {
    guid: Guid,
    user: Address,
    #[serde(deserialize_with = "lenient_u256")]
    index: U256,
    #[serde(deserialize_with = "lenient_u256")]
    pet_token_id: U256,
    #[serde(default, deserialize_with = "lenient_u256_vec")]
    chosen_items: Vec<U256>,
    #[serde(default)]
    reward_bonus: bool,
}

pub struct CompleteQuestHandler {
    message: CompleteQuestMessage,
    entropy: U256,
}

impl CompleteQuestHandler {
    pub fn from_message(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            message: serde_json::from_value(body)?,
            entropy: default_entropy(),
        })
    }

    fn params(&self) -> Value {
        let message = &self.message;
        json!({
            "user": message.user,
            "index": number_json(&message.index),
            "petTokenId": number_json(&message.pet_token_id),
            "chosenItems": numbers_json(&message.chosen_items),
            "rewardBonus": message.reward_bonus,
        })
    }
}

#[async_trait]
impl RequestHandler for CompleteQuestHandler {
    fn message_type(&self) -> MessageType {
        MessageType::CompleteQuest
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "QUEST"
    }

    fn origin(&self) -> Address {
        self.message.user
    }

    fn gas_limit(&self) -> u64 {
        COMPLETE_GAS_LIMIT
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let message = &self.message;
        let call = IQuest::completeQuestAndRollCall {
            user: message.user,
            index: message.index,
            petTokenId: message.pet_token_id,
            chosenItems: message.chosen_items.clone(),
            entropy: self.entropy,
            rewardBonus: message.reward_bonus,
        };
        Ok(vec![call.abi_encode().into()])
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        let mut payload = self.params();
        payload["type"] = json!("COMPLETE_QUEST_TRANSACTION_SENT");
        payload["messageGuid"] = json!(self.message.guid.message_guid());
        Notification {
            event: events::COMPLETE_QUEST_TRANSACTION_SENT,
            payload,
        }
    }

    fn failure_message(&self) -> Value {
        json!({
            "type": "COMPLETE_QUEST",
            "messageGuid": self.message.guid.message_guid(),
            "account": self.message.user,
            "params": self.params(),
        })
    }
}
