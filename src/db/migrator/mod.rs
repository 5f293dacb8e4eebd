use sea_orm_migration::prelude::*;

mod m20260301_create_users;
mod m20260302_create_forums;
mod m20260303_create_audit_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_create_users::Migration),
            Box::new(m20260302_create_forums::Migration),
            Box::new(m20260303_create_audit_logs::Migration),
        ]
    }
}
