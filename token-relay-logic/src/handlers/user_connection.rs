use super::{Guid, HandlerContext, MessageType, Notification, RequestHandler, lenient_u256};
use crate::{abi::ISystemChecker, error::HandlerError, notify::events};
use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

const CONNECT_GAS_LIMIT: u64 = 100_000;
const DISCONNECT_GAS_LIMIT: u64 = 80_000;

#[derive(Debug, Clone, Deserialize)]
struct ConnectionMessage {
    guid: Guid,
    address: Address,
    #[serde(deserialize_with = "lenient_u256")]
    nonce: U256,
    signature: Bytes,
}

/// Connects or disconnects a user through the system checker, using a
/// signature the user produced off-chain.
pub struct UserConnectionHandler {
    connect: bool,
    message: ConnectionMessage,
}

impl UserConnectionHandler {
    pub fn connect(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            connect: true,
            message: serde_json::from_value(body)?,
        })
    }

    pub fn disconnect(body: Value) -> Result<Self, HandlerError> {
        Ok(Self {
            connect: false,
            message: serde_json::from_value(body)?,
        })
    }
}

#[async_trait]
impl RequestHandler for UserConnectionHandler {
    fn message_type(&self) -> MessageType {
        if self.connect {
            MessageType::ConnectUser
        } else {
            MessageType::DisconnectUser
        }
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "SYSTEM_CHECKER"
    }

    fn origin(&self) -> Address {
        self.message.address
    }

    fn gas_limit(&self) -> u64 {
        if self.connect {
            CONNECT_GAS_LIMIT
        } else {
            DISCONNECT_GAS_LIMIT
        }
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let ConnectionMessage {
            address,
            nonce,
            signature,
            ..
        } = self.message.clone();
        let data = if self.connect {
            ISystemChecker::connectUserCall {
                user: address,
                nonce,
                signature,
            }
            .abi_encode()
        } else {
            ISystemChecker::disconnectUserCall {
                user: address,
                nonce,
                signature,
            }
            .abi_encode()
        };
        Ok(vec![data.into()])
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        let event = if self.connect {
            events::USER_CONNECTED
        } else {
            events::USER_DISCONNECTED
        };
        Notification {
            event,
            payload: json!({
                "type": self.message_type().to_string(),
                "messageGuid": self.message.guid.message_guid(),
                "account": self.message.address,
            }),
        }
    }

    fn failure_message(&self) -> Value {
        let message = &self.message;
        json!({
            "type": self.message_type().to_string(),
            "messageGuid": message.guid.message_guid(),
            "account": message.address,
            "params": {
                "address": message.address,
                "nonce": message.nonce.to_string(),
                "signature": message.signature,
            },
        })
    }
}
