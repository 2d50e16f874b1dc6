use super::{BlockTimestamps, DispatchContext, EventDispatcher, Outgoing};
use crate::{
    abi::IMarketplace,
    database::{ListingClosure, ListingRecord, RelayDatabase},
    error::DispatchError,
    notify::{NotificationSink, event_with_address, events},
};
use alloy::{
    primitives::{Address, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::json;
use std::sync::Arc;
use token_relay_entity::marketplace_listings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MarketplaceEvent {
    Created(ListingRecord),
    Removed {
        listing_id: U256,
        seller: Address,
        is_sale: bool,
        timestamp: NaiveDateTime,
    },
    Bought {
        listing_id: U256,
        seller: Address,
        buyer: Address,
    },
}

fn is_marketplace_event(log: &Log) -> bool {
    matches!(
        log.topic0(),
        Some(&IMarketplace::LogNewListing::SIGNATURE_HASH)
            | Some(&IMarketplace::LogRemoveListing::SIGNATURE_HASH)
            | Some(&IMarketplace::LogPurchase::SIGNATURE_HASH)
    )
}

pub(crate) fn decode_marketplace(
    log: &Log,
    timestamp: NaiveDateTime,
) -> Result<Option<MarketplaceEvent>, DispatchError> {
    let event = match log.topic0() {
        Some(&IMarketplace::LogNewListing::SIGNATURE_HASH) => {
            let event = log
                .log_decode::<IMarketplace::LogNewListing>()
                .context("failed to decode LogNewListing")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            MarketplaceEvent::Created(ListingRecord {
                listing_id: event.listingId,
                seller: event.seller,
                token_id: event.tokenId,
                amount: event.amount,
                price: event.price,
                timestamp,
            })
        }
        Some(&IMarketplace::LogRemoveListing::SIGNATURE_HASH) => {
            let event = log
                .log_decode::<IMarketplace::LogRemoveListing>()
                .context("failed to decode LogRemoveListing")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            MarketplaceEvent::Removed {
                listing_id: event.listingId,
                seller: event.seller,
                is_sale: event.isSale,
                timestamp,
            }
        }
        Some(&IMarketplace::LogPurchase::SIGNATURE_HASH) => {
            let event = log
                .log_decode::<IMarketplace::LogPurchase>()
                .context("failed to decode LogPurchase")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            MarketplaceEvent::Bought {
                listing_id: event.listingId,
                seller: event.seller,
                buyer: event.buyer,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn created(listing: &ListingRecord) -> Outgoing {
    Outgoing {
        event: event_with_address(events::LISTING_CREATED, &listing.seller),
        payload: json!({
            "type": "LISTING_CREATED",
            "account": listing.seller,
            "listingId": listing.listing_id.to_string(),
            "tokenId": listing.token_id.to_string(),
            "amount": listing.amount.to_string(),
            "price": listing.price.to_string(),
        }),
        address_hint: None,
    }
}

fn removed(seller: Address, is_sale: bool, row: &marketplace_listings::Model) -> Outgoing {
    Outgoing {
        event: event_with_address(events::LISTING_REMOVED, &seller),
        payload: json!({
            "type": "LISTING_REMOVED",
            "account": seller,
            "listingId": row.listing_id.to_string(),
            "tokenId": row.token_id.to_string(),
            "amount": row.amount.to_string(),
            "price": row.price.to_string(),
            "isSale": is_sale,
        }),
        address_hint: None,
    }
}

/// Sent to the buyer's channel; `account` stays the seller.
fn bought(seller: Address, buyer: Address, row: &marketplace_listings::Model) -> Outgoing {
    Outgoing {
        event: event_with_address(events::LISTING_BOUGHT, &buyer),
        payload: json!({
            "type": "LISTING_BOUGHT",
            "account": seller,
            "buyer": buyer,
            "listingId": row.listing_id.to_string(),
            "tokenId": row.token_id.to_string(),
            "amount": row.amount.to_string(),
            "price": row.price.to_string(),
        }),
        address_hint: None,
    }
}

/// Listing lifecycle of the item marketplace.
pub struct MarketplaceDispatcher {
    db: RelayDatabase,
    notifier: Arc<dyn NotificationSink>,
}

impl MarketplaceDispatcher {
    pub fn new(db: RelayDatabase, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { db, notifier }
    }
}

#[async_trait]
impl EventDispatcher for MarketplaceDispatcher {
    #[tracing::instrument(skip_all, fields(contract = %ctx.contract.code, logs = logs.len()))]
    async fn parse_events(
        &self,
        logs: &[Log],
        ctx: &DispatchContext<'_>,
    ) -> Result<(), DispatchError> {
        let contract_id = ctx.contract.id;
        let mut timestamps = BlockTimestamps::default();
        let mut outgoing = Vec::new();
        for log in logs {
            if !is_marketplace_event(log) {
                continue;
            }
            let timestamp = timestamps.get(ctx.provider, log).await?;
            let Some(event) = decode_marketplace(log, timestamp)? else {
                continue;
            };
            match event {
                MarketplaceEvent::Created(listing) => {
                    self.db.upsert_listing(contract_id, &listing).await?;
                    outgoing.push(created(&listing));
                }
                MarketplaceEvent::Removed {
                    listing_id,
                    seller,
                    is_sale,
                    timestamp,
                } => {
                    let closure = ListingClosure::Removed { timestamp, is_sale };
                    match self.db.close_listing(contract_id, listing_id, closure).await? {
                        Some(row) => outgoing.push(removed(seller, is_sale, &row)),
                        None => tracing::warn!(%listing_id, "removal of unknown listing, skipping"),
                    }
                }
                MarketplaceEvent::Bought {
                    listing_id,
                    seller,
                    buyer,
                } => {
                    let closure = ListingClosure::Bought { buyer };
                    match self.db.close_listing(contract_id, listing_id, closure).await? {
                        Some(row) => outgoing.push(bought(seller, buyer, &row)),
                        None => tracing::warn!(%listing_id, "purchase of unknown listing, skipping"),
                    }
                }
            }
        }

        for notification in outgoing {
            notification.send(self.notifier.as_ref());
        }
        Ok(())
    }
}
