use super::{
    Guid, HandlerContext, MessageType, Notification, RequestHandler, lenient_u256, number_json,
};
use crate::{abi::IPetInteraction, error::HandlerError, notify::events};
use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

const GAS_LIMIT: u64 = 180_000;

fn default_quantity() -> usize {
    1
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PetInteractionMessage {
    guid: Guid,
    address: Address,
    #[serde(deserialize_with = "lenient_u256")]
    pet_token_id: U256,
    #[serde(deserialize_with = "lenient_u256")]
    item_token_id: U256,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_quantity")]
    quantity: usize,
}

/// Uses an item on a pet, once per requested quantity.
pub struct PetInteractionHandler {
    message: PetInteractionMessage,
}

impl PetInteractionHandler {
    pub fn from_message(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            message: serde_json::from_value(body)?,
        })
    }
}

#[async_trait]
impl RequestHandler for PetInteractionHandler {
    fn message_type(&self) -> MessageType {
        MessageType::PetInteraction
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "PET_INTERACTION"
    }

    fn origin(&self) -> Address {
        self.message.address
    }

    fn gas_limit(&self) -> u64 {
        GAS_LIMIT
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let data: Bytes = IPetInteraction::interactCall {
            user: self.message.address,
            petTokenId: self.message.pet_token_id,
            itemTokenId: self.message.item_token_id,
        }
        .abi_encode()
        .into();
        Ok(vec![data; self.message.quantity])
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        let message = &self.message;
        Notification {
            event: events::PET_INTERACTION_TRANSACTION_SENT,
            payload: json!({
                "type": "PET_INTERACTION_TRANSACTION_SENT",
                "messageGuid": message.guid.message_guid(),
                "account": message.address,
                "petTokenId": number_json(&message.pet_token_id),
                "itemTokenId": number_json(&message.item_token_id),
            }),
        }
    }

    fn failure_message(&self) -> Value {
        let message = &self.message;
        json!({
            "type": "PET_INTERACTION",
            "messageGuid": message.guid.message_guid(),
            "account": message.address,
            "params": {
                "address": message.address,
                "petTokenId": number_json(&message.pet_token_id),
                "itemTokenId": number_json(&message.item_token_id),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn repeats_interaction_per_quantity() {
        let handler = PetInteractionHandler::from_message(json!({
            "type": "PET_INTERACTION",
            "guid": "0x03",
            "address": "0x0a1b2c3d4e5f60718293a4b5c6d7e8f901234567",
            "petTokenId": 12,
            "itemTokenId": "7",
            "quantity": 3,
        }))
        .unwrap();

        let calldata = handler.calldata().unwrap();
        assert_eq!(calldata.len(), 3);
        assert!(calldata.iter().all(|data| data == &calldata[0]));
        let txs = handler.transactions(Address::ZERO).unwrap();
        assert!(txs.iter().all(|tx| tx.gas_limit == 180_000));
        assert_eq!(handler.failure_message()["params"]["itemTokenId"], 7);
    }
}
