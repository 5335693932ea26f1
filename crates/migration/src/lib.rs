pub use sea_orm_migration::prelude::*;

mod m20261001_120000_create_email_requests;
mod m20261001_120100_create_email_delivery_status;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_120000_create_email_requests::Migration),
            Box::new(m20261001_120100_create_email_delivery_status::Migration),
        ]
    }
}
