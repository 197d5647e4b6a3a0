pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_auth_sessions_table;
mod m20260101_000002_create_oauth_account_links_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_auth_sessions_table::Migration),
            Box::new(m20260101_000002_create_oauth_account_links_table::Migration),
        ]
    }
}
