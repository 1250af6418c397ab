pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_users_table;
mod m20250101_000002_create_shops_table;
mod m20250101_000003_create_products_table;
mod m20250101_000004_create_coupons_table;
mod m20250101_000005_create_orders_tables;
mod m20250101_000006_create_complaints_table;
mod m20250101_000007_create_seller_verifications_table;
mod m20250101_000008_create_reviews_table;
mod m20250101_000009_add_shipping_and_review_votes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_users_table::Migration),
            Box::new(m20250101_000002_create_shops_table::Migration),
            Box::new(m20250101_000003_create_products_table::Migration),
            Box::new(m20250101_000004_create_coupons_table::Migration),
            Box::new(m20250101_000005_create_orders_tables::Migration),
            Box::new(m20250101_000006_create_complaints_table::Migration),
            Box::new(m20250101_000007_create_seller_verifications_table::Migration),
            Box::new(m20250101_000008_create_reviews_table::Migration),
            Box::new(m20250101_000009_add_shipping_and_review_votes::Migration),
        ]
    }
}
