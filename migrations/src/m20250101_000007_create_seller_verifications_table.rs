use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_users_table::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SellerVerifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SellerVerifications::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::SellerId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(SellerVerifications::ShopId).uuid().not_null())
                    .col(
                        ColumnDef::new(SellerVerifications::BusinessName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::BusinessType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::BusinessRegistrationNumber)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(SellerVerifications::TaxId).string().null())
                    .col(
                        ColumnDef::new(SellerVerifications::BusinessAddress)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::OwnerFullName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::OwnerEmail)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::OwnerPhone)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::IdentityDocument)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::BusinessDocuments)
                            .json()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SellerVerifications::BankAccount).json().null())
                    .col(
                        ColumnDef::new(SellerVerifications::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(SellerVerifications::ReviewedBy).uuid().null())
                    .col(
                        ColumnDef::new(SellerVerifications::ReviewedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::RejectionReason)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(SellerVerifications::Notes).text().null())
                    .col(
                        ColumnDef::new(SellerVerifications::ResubmissionCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::VerificationLevel)
                            .string_len(16)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::SubmittedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SellerVerifications::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_seller_verifications_seller")
                            .from(SellerVerifications::Table, SellerVerifications::SellerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_seller_verifications_status")
                    .table(SellerVerifications::Table)
                    .col(SellerVerifications::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SellerVerifications::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SellerVerifications {
    Table,
    Id,
    SellerId,
    ShopId,
    BusinessName,
    BusinessType,
    BusinessRegistrationNumber,
    TaxId,
    BusinessAddress,
    OwnerFullName,
    OwnerEmail,
    OwnerPhone,
    IdentityDocument,
    BusinessDocuments,
    BankAccount,
    Status,
    ReviewedBy,
    ReviewedAt,
    RejectionReason,
    Notes,
    ResubmissionCount,
    VerificationLevel,
    SubmittedAt,
    CreatedAt,
    UpdatedAt,
}
