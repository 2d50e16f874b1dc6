use super::{Guid, HandlerContext, MessageType, Notification, RequestHandler, generate_entropy};
use crate::{
    abi::IOpenPetBoxes, error::HandlerError, notify::events, relay::MetaTransaction,
};
use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

const ENTROPY_MULTIPLIER: u64 = 3_600_000;
const BOXES_PER_CALL: u64 = 20;
const GAS_PER_BOX: u64 = 180_000;
const MAX_GROUPING: usize = 2;

fn default_quantity() -> u64 {
    1
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
struct OpenBoxMessage {
    guid: Guid,
    address: Address,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_quantity")]
    quantity: u64,
}

/// Opens pet boxes, twenty per call. Gas is reserved per box plus one.
pub struct OpenBoxHandler {
    message: OpenBoxMessage,
    entropy: U256,
}

impl OpenBoxHandler {
    pub fn from_message(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            message: serde_json::from_value(body)?,
            entropy: generate_entropy(ENTROPY_MULTIPLIER),
        })
    }

    fn chunk_sizes(&self) -> impl Iterator<Item = u64> + '_ {
        let quantity = self.message.quantity;
        (0..quantity.div_ceil(BOXES_PER_CALL))
            .map(move |index| (quantity - index * BOXES_PER_CALL).min(BOXES_PER_CALL))
    }

    fn encode(&self, boxes: u64) -> Bytes {
        IOpenPetBoxes::openMultipleBoxesCall {
            user: self.message.address,
            quantity: U256::from(boxes),
            entropy: self.entropy,
            guid: self.message.guid.as_bytes32(),
        }
        .abi_encode()
        .into()
    }
}

#[async_trait]
impl RequestHandler for OpenBoxHandler {
    fn message_type(&self) -> MessageType {
        MessageType::OpenBox
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "OPEN_PET_BOXES"
    }

    fn origin(&self) -> Address {
        self.message.address
    }

    fn max_grouping(&self) -> usize {
        MAX_GROUPING
    }

    fn gas_limit(&self) -> u64 {
        GAS_PER_BOX
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        Ok(self.chunk_sizes().map(|boxes| self.encode(boxes)).collect())
    }

    fn transactions(&self, to: Address) -> Result<Vec<MetaTransaction>, HandlerError> {
        Ok(self
            .chunk_sizes()
            .map(|boxes| MetaTransaction {
                to,
                data: self.encode(boxes),
                gas_limit: GAS_PER_BOX * (boxes + 1),
            })
            .collect())
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        Notification {
            event: events::BOX_OPENED_TRANSACTION_SENT,
            payload: json!({
                "type": "OPEN_BOX",
                "messageGuid": self.message.guid.message_guid(),
                "account": self.message.address,
                "quantity": self.message.quantity,
            }),
        }
    }

    fn failure_message(&self) -> Value {
        json!({
            "type": "OPEN_BOX",
            "messageGuid": self.message.guid.message_guid(),
            "account": self.message.address,
            "params": {
                "address": self.message.address,
                "quantity": self.message.quantity,
            },
        })
    }
}
