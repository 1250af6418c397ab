use sea_orm_migration::prelude::*;

use super::m20250101_000005_create_orders_tables::Orders;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Complaints::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Complaints::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Complaints::ShopId).uuid().not_null())
                    .col(
                        ColumnDef::new(Complaints::OrderId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Complaints::ProductId).uuid().null())
                    .col(ColumnDef::new(Complaints::BuyerId).uuid().not_null())
                    .col(ColumnDef::new(Complaints::OrderCode).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Complaints::ComplaintType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Complaints::Title).string().not_null())
                    .col(ColumnDef::new(Complaints::Description).text().not_null())
                    .col(
                        ColumnDef::new(Complaints::Status)
                            .string_len(64)
                            .not_null()
                            .default("new"),
                    )
                    .col(ColumnDef::new(Complaints::EvidenceImages).json().not_null())
                    .col(ColumnDef::new(Complaints::SellerEvidence).json().not_null())
                    .col(
                        ColumnDef::new(Complaints::ResolutionAction)
                            .string_len(16)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Complaints::RefundAmount)
                            .decimal_len(12, 2)
                            .null(),
                    )
                    .col(ColumnDef::new(Complaints::RefundPercentage).integer().null())
                    .col(ColumnDef::new(Complaints::ResolutionNote).text().null())
                    .col(ColumnDef::new(Complaints::DecidedBy).uuid().null())
                    .col(
                        ColumnDef::new(Complaints::DecidedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Complaints::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Complaints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_complaints_order")
                            .from(Complaints::Table, Complaints::OrderId)
                            .to(Orders::Table, Orders::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_complaints_shop_status")
                    .table(Complaints::Table)
                    .col(Complaints::ShopId)
                    .col(Complaints::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Complaints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Complaints {
    Table,
    Id,
    ShopId,
    OrderId,
    ProductId,
    BuyerId,
    OrderCode,
    ComplaintType,
    Title,
    Description,
    Status,
    EvidenceImages,
    SellerEvidence,
    ResolutionAction,
    RefundAmount,
    RefundPercentage,
    ResolutionNote,
    DecidedBy,
    DecidedAt,
    CreatedAt,
    UpdatedAt,
}
