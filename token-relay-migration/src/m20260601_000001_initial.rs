use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "blockchain_contracts" (
                "id" serial PRIMARY KEY,
                "code" varchar NOT NULL,
                "mode" varchar NOT NULL,
                "address" bytea NOT NULL,
                "providers" text NOT NULL DEFAULT '',
                "next_block" bigint NOT NULL DEFAULT 0,
                "run_listener" boolean NOT NULL DEFAULT true,
                "token_type" varchar,
                "description" varchar,
                "abi" jsonb,
                "created_at" timestamp NOT NULL DEFAULT (now()),
                "updated_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE UNIQUE INDEX "blockchain_contracts_code_mode_key"
                ON "blockchain_contracts" ("code", "mode");

            CREATE TABLE "token_transfers" (
                "id" bigserial PRIMARY KEY,
                "contract_id" integer NOT NULL REFERENCES "blockchain_contracts" ("id") ON DELETE CASCADE,
                "tx_hash" bytea NOT NULL,
                "log_index" bigint NOT NULL,
                "block_number" bigint NOT NULL,
                "token_id" numeric,
                "from_address" bytea NOT NULL,
                "to_address" bytea NOT NULL,
                "value" numeric,
                "timestamp" timestamp NOT NULL,
                "created_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE UNIQUE INDEX "token_transfers_contract_tx_log_key"
                ON "token_transfers" ("contract_id", "tx_hash", "log_index");
            CREATE INDEX "token_transfers_block_number_idx"
                ON "token_transfers" ("contract_id", "block_number");

            CREATE TABLE "token_owners" (
                "id" bigserial PRIMARY KEY,
                "contract_id" integer NOT NULL REFERENCES "blockchain_contracts" ("id") ON DELETE CASCADE,
                "token_id" numeric NOT NULL,
                "owner" bytea NOT NULL,
                "tx_hash" bytea NOT NULL,
                "block_number" bigint NOT NULL,
                "timestamp" timestamp NOT NULL,
                "updated_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE UNIQUE INDEX "token_owners_contract_token_key"
                ON "token_owners" ("contract_id", "token_id");
            CREATE INDEX "token_owners_owner_idx" ON "token_owners" ("owner");

            CREATE TABLE "gold_transactions" (
                "id" bigserial PRIMARY KEY,
                "guid" varchar(64) NOT NULL UNIQUE,
                "contract_id" integer NOT NULL REFERENCES "blockchain_contracts" ("id") ON DELETE CASCADE,
                "account" bytea NOT NULL,
                "amount" numeric NOT NULL,
                "tx_hash" bytea NOT NULL,
                "block_number" bigint NOT NULL,
                "description" varchar NOT NULL DEFAULT '',
                "timestamp" timestamp NOT NULL,
                "created_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE INDEX "gold_transactions_account_idx" ON "gold_transactions" ("account");

            CREATE TABLE "work_messages" (
                "id" uuid PRIMARY KEY,
                "message_group" varchar,
                "body" jsonb NOT NULL,
                "visible_at" timestamp NOT NULL DEFAULT (now()),
                "receive_count" integer NOT NULL DEFAULT 0,
                "created_at" timestamp NOT NULL DEFAULT (now())
            );

            CREATE INDEX "work_messages_visible_at_idx"
                ON "work_messages" ("visible_at", "created_at");

            COMMENT ON TABLE "blockchain_contracts" IS 'Tracked contracts with their provider endpoints and block cursor';
            COMMENT ON COLUMN "blockchain_contracts"."providers" IS 'RPC endpoints joined by |';
            COMMENT ON TABLE "gold_transactions" IS 'Gold claims observed on chain, keyed by the claim guid';
            COMMENT ON TABLE "work_messages" IS 'Durable queue of relay work requests';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "work_messages";
            DROP TABLE "gold_transactions";
            DROP TABLE "token_owners";
            DROP TABLE "token_transfers";
            DROP TABLE "blockchain_contracts";
        "#;
        crate::from_sql(manager, sql).await
    }
}
