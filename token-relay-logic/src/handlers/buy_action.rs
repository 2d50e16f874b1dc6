use super::{Guid, HandlerContext, MessageType, Notification, RequestHandler};
use crate::{abi::IMilkAction, error::HandlerError, notify::events};
use alloy::{
    primitives::{Address, B256, Bytes},
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyActionMessage {
    guid: Guid,
    address: Address,
    action_key: B256,
}

/// Buys a milk action. The message guid is passed on-chain as the action data.
pub struct BuyActionHandler {
    message: BuyActionMessage,
}

impl BuyActionHandler {
    pub fn from_message(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            message: serde_json::from_value(body)?,
        })
    }
}

#[async_trait]
impl RequestHandler for BuyActionHandler {
    fn message_type(&self) -> MessageType {
        MessageType::BuyAction
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "MILK_ACTION"
    }

    fn origin(&self) -> Address {
        self.message.address
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let call = IMilkAction::buyCall {
            user: self.message.address,
            actionKey: self.message.action_key,
            data: self.message.guid.as_bytes32(),
        };
        Ok(vec![call.abi_encode().into()])
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        let message = &self.message;
        Notification {
            event: events::BUY_ACTION_TRANSACTION_SENT,
            payload: json!({
                "type": "BUY_ACTION",
                "messageGuid": message.guid.message_guid(),
                "account": message.address,
                "actionKey": message.action_key,
                "guid": message.guid.to_string(),
            }),
        }
    }

    fn failure_message(&self) -> Value {
        let message = &self.message;
        json!({
            "type": "BUY_ACTION",
            "messageGuid": message.guid.message_guid(),
            "account": message.address,
            "params": {
                "address": message.address,
                "actionKey": message.action_key,
                "data": message.guid.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn passes_guid_as_action_data() {
        let key = B256::repeat_byte(0x11);
        let handler = BuyActionHandler::from_message(json!({
            "type": "BUY_ACTION",
            "guid": "0xff",
            "address": "0x0a1b2c3d4e5f60718293a4b5c6d7e8f901234567",
            "actionKey": key,
        }))
        .unwrap();

        let call = IMilkAction::buyCall::abi_decode(&handler.calldata().unwrap()[0]).unwrap();
        assert_eq!(call.actionKey, key);
        assert_eq!(call.data, B256::with_last_byte(0xff));
        assert_eq!(handler.failure_message()["params"]["data"], "0xff");
    }
}
