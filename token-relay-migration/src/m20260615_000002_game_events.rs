use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "marketplace_listings" (
                "id" bigserial PRIMARY KEY,
                "contract_id" integer NOT NULL REFERENCES "blockchain_contracts" ("id") ON DELETE CASCADE,
                "listing_id" numeric NOT NULL,
                "seller" bytea NOT NULL,
                "token_id" numeric NOT NULL,
                "amount" numeric NOT NULL,
                "price" numeric NOT NULL,
                "created_timestamp" timestamp NOT NULL,
                "removed_timestamp" timestamp,
                "is_sale" boolean,
                "buyer" bytea,
                "updated_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE UNIQUE INDEX "marketplace_listings_contract_listing_key"
                ON "marketplace_listings" ("contract_id", "listing_id");
            CREATE INDEX "marketplace_listings_seller_idx" ON "marketplace_listings" ("seller");

            CREATE TABLE "item_transfers" (
                "id" bigserial PRIMARY KEY,
                "contract_id" integer NOT NULL REFERENCES "blockchain_contracts" ("id") ON DELETE CASCADE,
                "tx_hash" bytea NOT NULL,
                "log_index" bigint NOT NULL,
                "batch_index" integer NOT NULL DEFAULT 0,
                "block_number" bigint NOT NULL,
                "operator" bytea NOT NULL,
                "from_address" bytea NOT NULL,
                "to_address" bytea NOT NULL,
                "token_id" numeric NOT NULL,
                "quantity" numeric NOT NULL,
                "timestamp" timestamp NOT NULL,
                "created_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE UNIQUE INDEX "item_transfers_contract_tx_log_batch_key"
                ON "item_transfers" ("contract_id", "tx_hash", "log_index", "batch_index");
            CREATE INDEX "item_transfers_to_address_idx" ON "item_transfers" ("to_address", "token_id");
            CREATE INDEX "item_transfers_from_address_idx" ON "item_transfers" ("from_address", "token_id");

            CREATE TABLE "pet_interactions" (
                "id" bigserial PRIMARY KEY,
                "contract_id" integer NOT NULL REFERENCES "blockchain_contracts" ("id") ON DELETE CASCADE,
                "tx_hash" bytea NOT NULL,
                "log_index" bigint NOT NULL,
                "block_number" bigint NOT NULL,
                "account" bytea NOT NULL,
                "pet_token_id" numeric NOT NULL,
                "item_token_id" numeric NOT NULL,
                "timestamp" timestamp NOT NULL,
                "created_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE UNIQUE INDEX "pet_interactions_contract_tx_log_key"
                ON "pet_interactions" ("contract_id", "tx_hash", "log_index");
            CREATE INDEX "pet_interactions_pet_idx" ON "pet_interactions" ("pet_token_id");

            COMMENT ON TABLE "item_transfers" IS 'ERC-1155 transfers, one row per (log, batch entry)';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "pet_interactions";
            DROP TABLE "item_transfers";
            DROP TABLE "marketplace_listings";
        "#;
        crate::from_sql(manager, sql).await
    }
}
