use super::{Guid, HandlerContext, MessageType, Notification, RequestHandler, lenient_u256};
use crate::{abi::IMarketplace, error::HandlerError, notify::events};
use alloy::{
    primitives::{Address, Bytes, U256, utils::parse_ether},
    sol_types::SolCall,
};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, de::Error as _};
use serde_json::{Value, json};

const CREATE_LISTING_GAS_LIMIT: u64 = 254_000;
const REMOVE_LISTING_GAS_LIMIT: u64 = 140_000;
const BUY_LISTING_GAS_LIMIT: u64 = 230_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketplaceMessage {
    guid: Guid,
    seller: Option<Address>,
    buyer: Option<Address>,
    #[serde(default, deserialize_with = "optional_u256")]
    item_token_id: Option<U256>,
    #[serde(default, deserialize_with = "optional_u256")]
    amount: Option<U256>,
    #[serde(default, deserialize_with = "optional_u256")]
    listing_id: Option<U256>,
    /// Price in ether, e.g. `1.5`.
    price: Option<Value>,
}

fn optional_u256<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<U256>, D::Error> {
    lenient_u256(deserializer).map(Some)
}

/// Marketplace listings: create, remove and buy. The client receives the
/// original message back on success.
pub struct MarketplaceHandler {
    message_type: MessageType,
    message: MarketplaceMessage,
    body: Value,
    origin: Address,
}

impl MarketplaceHandler {
    pub fn from_message(message_type: MessageType, body: Value) -> Result<Self, HandlerError> {
        let message: MarketplaceMessage = serde_json::from_value(body.clone())?;
        let origin = message.buyer.or(message.seller).ok_or_else(|| {
            serde_json::Error::custom("marketplace message needs a buyer or a seller")
        })?;
        Ok(Self {
            message_type,
            message,
            body,
            origin,
        })
    }

    fn price_wei(&self) -> anyhow::Result<U256> {
        let price = match self.message.price.as_ref() {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Number(number)) => number.to_string(),
            _ => return Err(anyhow!("listing price is missing")),
        };
        parse_ether(&price).with_context(|| format!("invalid listing price {price}"))
    }

    fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let message = &self.message;
        let seller = || message.seller.ok_or_else(|| anyhow!("seller is missing"));
        let listing_id = || message.listing_id.ok_or_else(|| anyhow!("listingId is missing"));
        let data = match self.message_type {
            MessageType::CreateListing => IMarketplace::createListingCall {
                itemTokenId: message
                    .item_token_id
                    .ok_or_else(|| anyhow!("itemTokenId is missing"))?,
                amount: message.amount.ok_or_else(|| anyhow!("amount is missing"))?,
                price: self.price_wei()?,
                seller: seller()?,
            }
            .abi_encode(),
            MessageType::RemoveListing => IMarketplace::removeListingCall {
                listingId: listing_id()?,
                seller: seller()?,
            }
            .abi_encode(),
            MessageType::BuyListing => IMarketplace::buyListingCall {
                buyer: message.buyer.ok_or_else(|| anyhow!("buyer is missing"))?,
                listingId: listing_id()?,
            }
            .abi_encode(),
            other => return Err(anyhow!("unrecognized marketplace transaction {other}")),
        };
        Ok(data)
    }
}

#[async_trait]
impl RequestHandler for MarketplaceHandler {
    fn message_type(&self) -> MessageType {
        self.message_type
    }

    fn guid(&self) -> &Guid {
        &self.message.guid
    }

    fn contract_code(&self) -> &'static str {
        "MARKETPLACE"
    }

    fn origin(&self) -> Address {
        self.origin
    }

    fn gas_limit(&self) -> u64 {
        match self.message_type {
            MessageType::CreateListing => CREATE_LISTING_GAS_LIMIT,
            MessageType::RemoveListing => REMOVE_LISTING_GAS_LIMIT,
            _ => BUY_LISTING_GAS_LIMIT,
        }
    }

    fn address_hint(&self) -> Option<Address> {
        None
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        let data = self.encode().map_err(HandlerError::Contract)?;
        Ok(vec![data.into()])
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        let event = match self.message_type {
            MessageType::CreateListing => events::CREATE_LISTING_TRANSACTION_SENT,
            MessageType::RemoveListing => events::REMOVE_LISTING_TRANSACTION_SENT,
            _ => events::BUY_LISTING_TRANSACTION_SENT,
        };
        Notification {
            event,
            payload: self.body.clone(),
        }
    }

    fn failure_message(&self) -> Value {
        json!({
            "type": self.message_type.to_string(),
            "messageGuid": self.message.guid.message_guid(),
            "account": self.origin,
            "params": self.body,
        })
    }
}
