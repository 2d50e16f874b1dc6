use super::{
    Guid, HandlerContext, MessageType, Notification, RequestHandler, lenient_u256, number_json,
};
use crate::{abi::IItemFactory, error::HandlerError, notify::events};
use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Deserialize)]
struct BuyBoxMessage {
    guid: Guid,
    address: Address,
    #[serde(deserialize_with = "lenient_u256")]
    quantity: U256,
}

pub struct BuyBoxHandler {
    message: BuyBoxMessage,
}

impl BuyBoxHandler {
    pub fn from_message(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            message: serde_json::from_value(body)?,
        })
    }
}

#[async_trait]
impl RequestHandler for BuyBoxHandler {
    fn message_type(&self) -> MessageType {
        MessageType::BuyBox
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "ITEM_FACTORY"
    }

    fn origin(&self) -> Address {
        self.message.address
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let call = IItemFactory::buyBoxCall {
            user: self.message.address,
            quantity: self.message.quantity,
        };
        Ok(vec![call.abi_encode().into()])
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        Notification {
            event: events::BUY_BOX_TRANSACTION_SENT,
            payload: json!({
                "type": "BUY_BOX",
                "messageGuid": self.message.guid.message_guid(),
                "account": self.message.address,
                "quantity": number_json(&self.message.quantity),
            }),
        }
    }

    fn failure_message(&self) -> Value {
        json!({
            "type": "BUY_BOX",
            "messageGuid": self.message.guid.message_guid(),
            "account": self.message.address,
            "params": {
                "address": self.message.address,
                "quantity": number_json(&self.message.quantity),
            },
        })
    }
}
