use crate::{
    contracts::{ContractSource, TrackedContract},
    cursor::CursorStore,
    handlers::GoldLedger,
    supervisor::ContractRows,
};
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveValue, ColumnTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Statement, TransactionTrait,
    entity::prelude::*,
    prelude::Expr,
    sea_query::OnConflict,
};
use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};
use token_relay_entity::{
    blockchain_contracts, gold_transactions, item_transfers, marketplace_listings,
    pet_interactions, token_owners, token_transfers, work_messages,
};

/// A decoded transfer log ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub token_id: Option<U256>,
    pub from: Address,
    pub to: Address,
    pub value: Option<U256>,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldClaimRecord {
    pub guid: String,
    pub account: Address,
    pub amount: U256,
    pub tx_hash: B256,
    pub block_number: u64,
    pub description: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    pub listing_id: U256,
    pub seller: Address,
    pub token_id: U256,
    pub amount: U256,
    pub price: U256,
    pub timestamp: NaiveDateTime,
}

/// How a listing left the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingClosure {
    Removed {
        timestamp: NaiveDateTime,
        is_sale: bool,
    },
    Bought {
        buyer: Address,
    },
}

/// One entry of an ERC-1155 transfer. Batch transfers yield one record per
/// id, distinguished by `batch_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTransferRecord {
    pub tx_hash: B256,
    pub log_index: u64,
    pub batch_index: u32,
    pub block_number: u64,
    pub operator: Address,
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
    pub quantity: U256,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetInteractionRecord {
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub account: Address,
    pub pet_token_id: U256,
    pub item_token_id: U256,
    pub timestamp: NaiveDateTime,
}

fn to_decimal(value: U256) -> Result<BigDecimal, DbErr> {
    BigDecimal::from_str(&value.to_string()).map_err(|e| DbErr::Custom(e.to_string()))
}

/// Last transfer per token wins.
fn latest_owners(transfers: &[TransferRecord]) -> Vec<&TransferRecord> {
    let mut owners: HashMap<U256, &TransferRecord> = HashMap::new();
    for transfer in transfers {
        if let Some(token_id) = transfer.token_id {
            owners.insert(token_id, transfer);
        }
    }
    let mut owners: Vec<_> = owners.into_values().collect();
    owners.sort_by_key(|t| (t.block_number, t.log_index));
    owners
}

#[derive(Clone)]
pub struct RelayDatabase {
    pub db: Arc<DatabaseConnection>,
}

impl RelayDatabase {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn load_tracked_contracts(&self, mode: &str) -> anyhow::Result<Vec<TrackedContract>> {
        let models = blockchain_contracts::Entity::find()
            .filter(blockchain_contracts::Column::Mode.eq(mode))
            .all(self.db.as_ref())
            .await
            .inspect_err(|e| tracing::error!(err =? e, mode, "failed to load tracked contracts"))?;

        models
            .into_iter()
            .filter_map(|model| match TrackedContract::try_from(model) {
                Ok(contract) => Some(Ok(contract)),
                Err(err) => {
                    tracing::warn!(err = ?err, "skipping malformed contract row");
                    None
                }
            })
            .collect()
    }

    pub async fn find_contract(
        &self,
        code: &str,
        mode: &str,
    ) -> anyhow::Result<Option<TrackedContract>> {
        blockchain_contracts::Entity::find()
            .filter(blockchain_contracts::Column::Code.eq(code))
            .filter(blockchain_contracts::Column::Mode.eq(mode))
            .one(self.db.as_ref())
            .await?
            .map(TrackedContract::try_from)
            .transpose()
    }

    pub async fn update_cursor(&self, contract_id: i32, next_block: u64) -> Result<(), DbErr> {
        blockchain_contracts::Entity::update_many()
            .col_expr(
                blockchain_contracts::Column::NextBlock,
                Expr::value(next_block as i64),
            )
            .col_expr(
                blockchain_contracts::Column::UpdatedAt,
                Expr::current_timestamp().into(),
            )
            .filter(blockchain_contracts::Column::Id.eq(contract_id))
            .exec(self.db.as_ref())
            .await
            .inspect_err(|e| tracing::error!(err =? e, contract_id, "failed to save cursor"))?;
        Ok(())
    }

    /// Upserts transfers and, for ERC-721 contracts, the resulting owners in
    /// one transaction.
    pub async fn record_transfers(
        &self,
        contract_id: i32,
        transfers: Vec<TransferRecord>,
        update_owners: bool,
    ) -> Result<(), DbErr> {
        if transfers.is_empty() {
            return Ok(());
        }

        let transfer_models = transfers
            .iter()
            .map(|t| {
                Ok(token_transfers::ActiveModel {
                    contract_id: ActiveValue::Set(contract_id),
                    tx_hash: ActiveValue::Set(t.tx_hash.to_vec()),
                    log_index: ActiveValue::Set(t.log_index as i64),
                    block_number: ActiveValue::Set(t.block_number as i64),
                    token_id: ActiveValue::Set(t.token_id.map(to_decimal).transpose()?),
                    from_address: ActiveValue::Set(t.from.to_vec()),
                    to_address: ActiveValue::Set(t.to.to_vec()),
                    value: ActiveValue::Set(t.value.map(to_decimal).transpose()?),
                    timestamp: ActiveValue::Set(t.timestamp),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>, DbErr>>()?;

        let owner_models = if update_owners {
            latest_owners(&transfers)
                .into_iter()
                .map(|t| {
                    Ok(token_owners::ActiveModel {
                        contract_id: ActiveValue::Set(contract_id),
                        token_id: ActiveValue::Set(to_decimal(t.token_id.unwrap_or_default())?),
                        owner: ActiveValue::Set(t.to.to_vec()),
                        tx_hash: ActiveValue::Set(t.tx_hash.to_vec()),
                        block_number: ActiveValue::Set(t.block_number as i64),
                        timestamp: ActiveValue::Set(t.timestamp),
                        ..Default::default()
                    })
                })
                .collect::<Result<Vec<_>, DbErr>>()?
        } else {
            vec![]
        };

        self.db
            .transaction::<_, (), DbErr>(|tx| {
                Box::pin(async move {
                    token_transfers::Entity::insert_many(transfer_models)
                        .on_conflict(
                            OnConflict::columns([
                                token_transfers::Column::ContractId,
                                token_transfers::Column::TxHash,
                                token_transfers::Column::LogIndex,
                            ])
                            .update_columns([
                                token_transfers::Column::BlockNumber,
                                token_transfers::Column::TokenId,
                                token_transfers::Column::FromAddress,
                                token_transfers::Column::ToAddress,
                                token_transfers::Column::Value,
                                token_transfers::Column::Timestamp,
                            ])
                            .to_owned(),
                        )
                        .exec(tx)
                        .await?;

                    if !owner_models.is_empty() {
                        token_owners::Entity::insert_many(owner_models)
                            .on_conflict(
                                OnConflict::columns([
                                    token_owners::Column::ContractId,
                                    token_owners::Column::TokenId,
                                ])
                                .update_columns([
                                    token_owners::Column::Owner,
                                    token_owners::Column::TxHash,
                                    token_owners::Column::BlockNumber,
                                    token_owners::Column::Timestamp,
                                ])
                                .value(token_owners::Column::UpdatedAt, Expr::current_timestamp())
                                .to_owned(),
                            )
                            .exec(tx)
                            .await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| {
                tracing::error!(err =? e, contract_id, "failed to record transfers");
                match e {
                    sea_orm::TransactionError::Connection(e) => e,
                    sea_orm::TransactionError::Transaction(e) => e,
                }
            })
    }

    pub async fn record_gold_claims(
        &self,
        contract_id: i32,
        claims: Vec<GoldClaimRecord>,
    ) -> Result<(), DbErr> {
        if claims.is_empty() {
            return Ok(());
        }
        let models = claims
            .into_iter()
            .map(|c| {
                Ok(gold_transactions::ActiveModel {
                    guid: ActiveValue::Set(c.guid),
                    contract_id: ActiveValue::Set(contract_id),
                    account: ActiveValue::Set(c.account.to_vec()),
                    amount: ActiveValue::Set(to_decimal(c.amount)?),
                    tx_hash: ActiveValue::Set(c.tx_hash.to_vec()),
                    block_number: ActiveValue::Set(c.block_number as i64),
                    description: ActiveValue::Set(c.description),
                    timestamp: ActiveValue::Set(c.timestamp),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>, DbErr>>()?;

        gold_transactions::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(gold_transactions::Column::Guid)
                    .update_columns([
                        gold_transactions::Column::Amount,
                        gold_transactions::Column::TxHash,
                        gold_transactions::Column::BlockNumber,
                        gold_transactions::Column::Timestamp,
                    ])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await
            .inspect_err(|e| tracing::error!(err =? e, contract_id, "failed to record gold claims"))?;
        Ok(())
    }

    /// Creates the listing or refreshes its terms. Closing fields are kept.
    pub async fn upsert_listing(&self, contract_id: i32, listing: &ListingRecord) -> Result<(), DbErr> {
        let model = marketplace_listings::ActiveModel {
            contract_id: ActiveValue::Set(contract_id),
            listing_id: ActiveValue::Set(to_decimal(listing.listing_id)?),
            seller: ActiveValue::Set(listing.seller.to_vec()),
            token_id: ActiveValue::Set(to_decimal(listing.token_id)?),
            amount: ActiveValue::Set(to_decimal(listing.amount)?),
            price: ActiveValue::Set(to_decimal(listing.price)?),
            created_timestamp: ActiveValue::Set(listing.timestamp),
            ..Default::default()
        };
        marketplace_listings::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    marketplace_listings::Column::ContractId,
                    marketplace_listings::Column::ListingId,
                ])
                .update_columns([
                    marketplace_listings::Column::Seller,
                    marketplace_listings::Column::TokenId,
                    marketplace_listings::Column::Amount,
                    marketplace_listings::Column::Price,
                    marketplace_listings::Column::CreatedTimestamp,
                ])
                .value(marketplace_listings::Column::UpdatedAt, Expr::current_timestamp())
                .to_owned(),
            )
            .exec(self.db.as_ref())
            .await
            .inspect_err(|e| tracing::error!(err =? e, contract_id, "failed to upsert listing"))?;
        Ok(())
    }

    /// Marks a listing removed or bought. Returns `None` for unknown listings.
    pub async fn close_listing(
        &self,
        contract_id: i32,
        listing_id: U256,
        closure: ListingClosure,
    ) -> Result<Option<marketplace_listings::Model>, DbErr> {
        let update = marketplace_listings::Entity::update_many()
            .col_expr(
                marketplace_listings::Column::UpdatedAt,
                Expr::current_timestamp().into(),
            )
            .filter(marketplace_listings::Column::ContractId.eq(contract_id))
            .filter(marketplace_listings::Column::ListingId.eq(to_decimal(listing_id)?));
        let update = match closure {
            ListingClosure::Removed { timestamp, is_sale } => update
                .col_expr(
                    marketplace_listings::Column::RemovedTimestamp,
                    Expr::value(timestamp),
                )
                .col_expr(marketplace_listings::Column::IsSale, Expr::value(is_sale)),
            ListingClosure::Bought { buyer } => update.col_expr(
                marketplace_listings::Column::Buyer,
                Expr::value(buyer.to_vec()),
            ),
        };
        let rows = update
            .exec_with_returning(self.db.as_ref())
            .await
            .inspect_err(|e| tracing::error!(err =? e, contract_id, "failed to close listing"))?;
        Ok(rows.into_iter().next())
    }

    pub async fn record_item_transfers(
        &self,
        contract_id: i32,
        transfers: Vec<ItemTransferRecord>,
    ) -> Result<(), DbErr> {
        if transfers.is_empty() {
            return Ok(());
        }
        let models = transfers
            .into_iter()
            .map(|t| {
                Ok(item_transfers::ActiveModel {
                    contract_id: ActiveValue::Set(contract_id),
                    tx_hash: ActiveValue::Set(t.tx_hash.to_vec()),
                    log_index: ActiveValue::Set(t.log_index as i64),
                    batch_index: ActiveValue::Set(t.batch_index as i32),
                    block_number: ActiveValue::Set(t.block_number as i64),
                    operator: ActiveValue::Set(t.operator.to_vec()),
                    from_address: ActiveValue::Set(t.from.to_vec()),
                    to_address: ActiveValue::Set(t.to.to_vec()),
                    token_id: ActiveValue::Set(to_decimal(t.token_id)?),
                    quantity: ActiveValue::Set(to_decimal(t.quantity)?),
                    timestamp: ActiveValue::Set(t.timestamp),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>, DbErr>>()?;

        item_transfers::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    item_transfers::Column::ContractId,
                    item_transfers::Column::TxHash,
                    item_transfers::Column::LogIndex,
                    item_transfers::Column::BatchIndex,
                ])
                .update_columns([
                    item_transfers::Column::BlockNumber,
                    item_transfers::Column::Quantity,
                    item_transfers::Column::Timestamp,
                ])
                .to_owned(),
            )
            .exec(self.db.as_ref())
            .await
            .inspect_err(|e| tracing::error!(err =? e, contract_id, "failed to record item transfers"))?;
        Ok(())
    }

    pub async fn record_pet_interactions(
        &self,
        contract_id: i32,
        interactions: Vec<PetInteractionRecord>,
    ) -> Result<(), DbErr> {
        if interactions.is_empty() {
            return Ok(());
        }
        let models = interactions
            .into_iter()
            .map(|i| {
                Ok(pet_interactions::ActiveModel {
                    contract_id: ActiveValue::Set(contract_id),
                    tx_hash: ActiveValue::Set(i.tx_hash.to_vec()),
                    log_index: ActiveValue::Set(i.log_index as i64),
                    block_number: ActiveValue::Set(i.block_number as i64),
                    account: ActiveValue::Set(i.account.to_vec()),
                    pet_token_id: ActiveValue::Set(to_decimal(i.pet_token_id)?),
                    item_token_id: ActiveValue::Set(to_decimal(i.item_token_id)?),
                    timestamp: ActiveValue::Set(i.timestamp),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>, DbErr>>()?;

        pet_interactions::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    pet_interactions::Column::ContractId,
                    pet_interactions::Column::TxHash,
                    pet_interactions::Column::LogIndex,
                ])
                .update_columns([
                    pet_interactions::Column::BlockNumber,
                    pet_interactions::Column::Timestamp,
                ])
                .to_owned(),
            )
            .exec(self.db.as_ref())
            .await
            .inspect_err(|e| tracing::error!(err =? e, contract_id, "failed to record pet interactions"))?;
        Ok(())
    }

    pub async fn gold_transaction_exists(&self, guid: &str) -> Result<bool, DbErr> {
        let count = gold_transactions::Entity::find()
            .filter(gold_transactions::Column::Guid.eq(guid))
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    pub async fn enqueue_message(
        &self,
        group: Option<String>,
        body: serde_json::Value,
    ) -> Result<Uuid, DbErr> {
        let id = Uuid::new_v4();
        work_messages::Entity::insert(work_messages::ActiveModel {
            id: ActiveValue::Set(id),
            message_group: ActiveValue::Set(group),
            body: ActiveValue::Set(body),
            ..Default::default()
        })
        .exec(self.db.as_ref())
        .await
        .inspect_err(|e| tracing::error!(err =? e, "failed to enqueue message"))?;
        Ok(id)
    }

    /// Claims up to `max` visible messages and hides them for `visibility_timeout`.
    pub async fn receive_messages(
        &self,
        max: u64,
        visibility_timeout: Duration,
    ) -> Result<Vec<work_messages::Model>, DbErr> {
        let sql = r#"
            WITH next_messages AS (
                SELECT id FROM work_messages
                WHERE visible_at <= NOW()
                ORDER BY created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE work_messages
            SET visible_at = NOW() + make_interval(secs => $2),
                receive_count = receive_count + 1
            WHERE id IN (SELECT id FROM next_messages)
            RETURNING id, message_group, body, visible_at, receive_count, created_at
        "#;
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            vec![
                (max as i64).into(),
                visibility_timeout.as_secs_f64().into(),
            ],
        );
        let mut messages = work_messages::Entity::find()
            .from_raw_sql(statement)
            .all(self.db.as_ref())
            .await
            .inspect_err(|e| tracing::error!(err =? e, "failed to receive messages"))?;
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    pub async fn delete_messages(&self, ids: Vec<Uuid>) -> Result<(), DbErr> {
        if ids.is_empty() {
            return Ok(());
        }
        work_messages::Entity::delete_many()
            .filter(work_messages::Column::Id.is_in(ids))
            .exec(self.db.as_ref())
            .await
            .inspect_err(|e| tracing::error!(err =? e, "failed to delete messages"))?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), DbErr> {
        self.db.ping().await
    }
}

#[async_trait]
impl CursorStore for RelayDatabase {
    async fn save_cursor(&self, contract_id: i32, next_block: u64) -> anyhow::Result<()> {
        Ok(self.update_cursor(contract_id, next_block).await?)
    }

    async fn reconnect(&self) -> anyhow::Result<()> {
        Ok(self.ping().await?)
    }
}

#[async_trait]
impl ContractRows for RelayDatabase {
    async fn tracked_contracts(&self, mode: &str) -> anyhow::Result<Vec<TrackedContract>> {
        self.load_tracked_contracts(mode).await
    }
}

#[async_trait]
impl ContractSource for RelayDatabase {
    async fn find_contract(&self, code: &str, mode: &str) -> anyhow::Result<Option<TrackedContract>> {
        RelayDatabase::find_contract(self, code, mode).await
    }
}

#[async_trait]
impl GoldLedger for RelayDatabase {
    async fn gold_transaction_exists(&self, guid: &str) -> anyhow::Result<bool> {
        Ok(RelayDatabase::gold_transaction_exists(self, guid).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_db;
    use pretty_assertions::assert_eq;

    fn transfer(token_id: u64, to: u8, block_number: u64, log_index: u64) -> TransferRecord {
        TransferRecord {
            tx_hash: B256::repeat_byte(block_number as u8),
            log_index,
            block_number,
            token_id: Some(U256::from(token_id)),
            from: Address::ZERO,
            to: Address::repeat_byte(to),
            value: None,
            timestamp: NaiveDateTime::default(),
        }
    }

    #[test]
    fn latest_owner_wins() {
        let transfers = vec![transfer(1, 1, 10, 0), transfer(2, 2, 10, 1), transfer(1, 3, 11, 0)];
        let owners: Vec<_> = latest_owners(&transfers)
            .into_iter()
            .map(|t| (t.token_id.unwrap(), t.to))
            .collect();
        assert_eq!(
            owners,
            vec![
                (U256::from(2), Address::repeat_byte(2)),
                (U256::from(1), Address::repeat_byte(3)),
            ]
        );
    }

    async fn insert_contract(db: &RelayDatabase, code: &str) -> i32 {
        let model = blockchain_contracts::ActiveModel {
            code: ActiveValue::Set(code.to_string()),
            mode: ActiveValue::Set("test".to_string()),
            address: ActiveValue::Set(vec![1; 20]),
            providers: ActiveValue::Set("http://a.io|http://b.io".to_string()),
            next_block: ActiveValue::Set(100),
            run_listener: ActiveValue::Set(true),
            ..Default::default()
        };
        blockchain_contracts::Entity::insert(model)
            .exec(db.db.as_ref())
            .await
            .unwrap()
            .last_insert_id
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn cursor_and_flags_roundtrip() {
        let guard = init_db("relay_db_cursor_and_flags").await;
        let db = RelayDatabase::new(guard.client());
        let id = insert_contract(&db, "COOLCAT_721").await;

        db.save_cursor(id, 151).await.unwrap();
        let contracts = db.load_tracked_contracts("test").await.unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].next_block, 151);
        assert_eq!(contracts[0].providers, vec!["http://a.io", "http://b.io"]);

        assert!(contracts[0].enabled);
        assert_eq!(contracts[0].id, id);
        assert!(db.find_contract("COOLCAT_721", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn transfers_are_idempotent() {
        let guard = init_db("relay_db_transfers_are_idempotent").await;
        let db = RelayDatabase::new(guard.client());
        let id = insert_contract(&db, "COOLPET_721").await;

        let transfers = vec![transfer(1, 1, 10, 0), transfer(1, 2, 11, 0)];
        db.record_transfers(id, transfers.clone(), true).await.unwrap();
        db.record_transfers(id, transfers, true).await.unwrap();

        let stored = token_transfers::Entity::find()
            .count(db.db.as_ref())
            .await
            .unwrap();
        assert_eq!(stored, 2);
        let owner = token_owners::Entity::find()
            .one(db.db.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.owner, vec![2; 20]);
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn gold_claims_are_deduplicated_by_guid() {
        let guard = init_db("relay_db_gold_claims").await;
        let db = RelayDatabase::new(guard.client());
        let id = insert_contract(&db, "TREASURY").await;
        let guid = format!("{:064x}", 42);
        let claim = GoldClaimRecord {
            guid: guid.clone(),
            account: Address::repeat_byte(5),
            amount: U256::from(1000),
            tx_hash: B256::repeat_byte(1),
            block_number: 12,
            description: "Cool Cat owner GOLD claimed".to_string(),
            timestamp: NaiveDateTime::default(),
        };
        assert!(!db.gold_transaction_exists(&guid).await.unwrap());
        db.record_gold_claims(id, vec![claim.clone()]).await.unwrap();
        db.record_gold_claims(id, vec![claim]).await.unwrap();
        assert!(db.gold_transaction_exists(&guid).await.unwrap());
        assert_eq!(
            gold_transactions::Entity::find()
                .count(db.db.as_ref())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn listing_lifecycle_keeps_terms() {
        let guard = init_db("relay_db_listing_lifecycle").await;
        let db = RelayDatabase::new(guard.client());
        let id = insert_contract(&db, "MARKETPLACE").await;
        let listing = ListingRecord {
            listing_id: U256::from(7),
            seller: Address::repeat_byte(3),
            token_id: U256::from(301),
            amount: U256::from(2),
            price: U256::from(1500),
            timestamp: NaiveDateTime::default(),
        };

        assert!(
            db.close_listing(id, U256::from(7), ListingClosure::Bought {
                buyer: Address::repeat_byte(4)
            })
            .await
            .unwrap()
            .is_none()
        );
        db.upsert_listing(id, &listing).await.unwrap();
        db.upsert_listing(id, &listing).await.unwrap();

        let bought = db
            .close_listing(id, U256::from(7), ListingClosure::Bought {
                buyer: Address::repeat_byte(4),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bought.buyer, Some(vec![4; 20]));
        assert_eq!(bought.token_id.to_string(), "301");

        let removed = db
            .close_listing(id, U256::from(7), ListingClosure::Removed {
                timestamp: NaiveDateTime::default(),
                is_sale: true,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.is_sale, Some(true));
        assert_eq!(removed.buyer, Some(vec![4; 20]));
        assert_eq!(
            marketplace_listings::Entity::find()
                .count(db.db.as_ref())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn item_transfers_and_interactions_are_idempotent() {
        let guard = init_db("relay_db_item_transfers").await;
        let db = RelayDatabase::new(guard.client());
        let factory = insert_contract(&db, "ITEM_FACTORY").await;
        let pets = insert_contract(&db, "PET_INTERACTION").await;
        let transfers: Vec<_> = (0..2)
            .map(|batch_index| ItemTransferRecord {
                tx_hash: B256::repeat_byte(1),
                log_index: 3,
                batch_index,
                block_number: 12,
                operator: Address::repeat_byte(9),
                from: Address::ZERO,
                to: Address::repeat_byte(2),
                token_id: U256::from(40 + batch_index),
                quantity: U256::from(1),
                timestamp: NaiveDateTime::default(),
            })
            .collect();
        let interaction = PetInteractionRecord {
            tx_hash: B256::repeat_byte(2),
            log_index: 0,
            block_number: 13,
            account: Address::repeat_byte(2),
            pet_token_id: U256::from(19),
            item_token_id: U256::from(40),
            timestamp: NaiveDateTime::default(),
        };

        for _ in 0..2 {
            db.record_item_transfers(factory, transfers.clone()).await.unwrap();
            db.record_pet_interactions(pets, vec![interaction.clone()])
                .await
                .unwrap();
        }
        assert_eq!(
            item_transfers::Entity::find().count(db.db.as_ref()).await.unwrap(),
            2
        );
        assert_eq!(
            pet_interactions::Entity::find().count(db.db.as_ref()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn received_messages_stay_hidden_until_timeout() {
        let guard = init_db("relay_db_work_messages").await;
        let db = RelayDatabase::new(guard.client());
        let first = db
            .enqueue_message(None, serde_json::json!({"type": "BUY_BOX"}))
            .await
            .unwrap();
        db.enqueue_message(None, serde_json::json!({"type": "OPEN_BOX"}))
            .await
            .unwrap();

        let batch = db.receive_messages(1, Duration::from_secs(30)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, first);
        assert_eq!(batch[0].receive_count, 1);

        let rest = db.receive_messages(10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(db.receive_messages(10, Duration::from_secs(30)).await.unwrap().is_empty());

        db.delete_messages(vec![first]).await.unwrap();
        let remaining = work_messages::Entity::find()
            .count(db.db.as_ref())
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn expired_messages_are_redelivered() {
        let guard = init_db("relay_db_redelivery").await;
        let db = RelayDatabase::new(guard.client());
        db.enqueue_message(Some("group".to_string()), serde_json::json!({}))
            .await
            .unwrap();

        let batch = db.receive_messages(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);
        let again = db.receive_messages(10, Duration::ZERO).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].receive_count, 2);
        assert_eq!(again[0].message_group.as_deref(), Some("group"));
    }
}
