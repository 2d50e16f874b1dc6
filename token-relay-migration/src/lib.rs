pub use sea_orm_migration::prelude::*;

mod m20260601_000001_initial;
mod m20260615_000002_game_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260601_000001_initial::Migration),
            Box::new(m20260615_000002_game_events::Migration),
        ]
    }
}

pub async fn from_sql(manager: &SchemaManager<'_>, content: &str) -> Result<(), DbErr> {
    manager.get_connection().execute_unprepared(content).await?;
    Ok(())
}
