//! Migration to create the ad_insights table.
//!
//! Daily performance facts keyed by (account_id, entity_id, level, date).
//! The surrogate id keeps the entity model simple; the unique index is the
//! upsert target.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdInsights::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdInsights::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AdInsights::AccountId).text().not_null())
                    .col(ColumnDef::new(AdInsights::EntityId).text().not_null())
                    .col(ColumnDef::new(AdInsights::Level).text().not_null())
                    .col(ColumnDef::new(AdInsights::Date).date().not_null())
                    .col(
                        ColumnDef::new(AdInsights::Spend)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(AdInsights::Impressions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AdInsights::Clicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(AdInsights::Cpa).double().null())
                    .col(ColumnDef::new(AdInsights::Roas).double().null())
                    .col(ColumnDef::new(AdInsights::PurchaseValue).double().null())
                    .col(ColumnDef::new(AdInsights::Currency).text().null())
                    .col(
                        ColumnDef::new(AdInsights::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AdInsights::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ad_insights_account_id")
                            .from(AdInsights::Table, AdInsights::AccountId)
                            .to(AdAccounts::Table, AdAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_ad_insights_account_entity_level_date")
                    .table(AdInsights::Table)
                    .col(AdInsights::AccountId)
                    .col(AdInsights::EntityId)
                    .col(AdInsights::Level)
                    .col(AdInsights::Date)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ad_insights_level_date")
                    .table(AdInsights::Table)
                    .col(AdInsights::Level)
                    .col(AdInsights::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AdInsights::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AdAccounts {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum AdInsights {
    Table,
    Id,
    AccountId,
    EntityId,
    Level,
    Date,
    Spend,
    Impressions,
    Clicks,
    Cpa,
    Roas,
    PurchaseValue,
    Currency,
    CreatedAt,
    UpdatedAt,
}
