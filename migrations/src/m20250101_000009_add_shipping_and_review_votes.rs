use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_users_table::Users;
use super::m20250101_000005_create_orders_tables::Orders;
use super::m20250101_000008_create_reviews_table::Reviews;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Orders::Table)
                    .add_column(ColumnDef::new(Orders::TrackingNumber).string_len(64).null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_orders_tracking_number")
                    .table(Orders::Table)
                    .col(Orders::TrackingNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Reviews::Table)
                    .add_column(
                        ColumnDef::new(Reviews::HelpfulVotes)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReviewVotes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ReviewVotes::ReviewId).uuid().not_null())
                    .col(ColumnDef::new(ReviewVotes::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(ReviewVotes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(ReviewVotes::ReviewId)
                            .col(ReviewVotes::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_review_votes_review")
                            .from(ReviewVotes::Table, ReviewVotes::ReviewId)
                            .to(Reviews::Table, Reviews::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_review_votes_user")
                            .from(ReviewVotes::Table, ReviewVotes::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReviewVotes::Table).to_owned())
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(Reviews::Table)
                    .drop_column(Reviews::HelpfulVotes)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_orders_tracking_number")
                    .table(Orders::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(Orders::Table)
                    .drop_column(Orders::TrackingNumber)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
pub enum ReviewVotes {
    Table,
    ReviewId,
    UserId,
    CreatedAt,
}
