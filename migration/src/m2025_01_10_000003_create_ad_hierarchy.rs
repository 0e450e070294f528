//! Migration to create the mirrored entity hierarchy.
//!
//! Creates ad_accounts, campaigns, ad_sets and ads. Rows are keyed by the
//! provider-assigned id; child to parent links below the account level are
//! nullable so orphaned leaves can still be stored.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdAccounts::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AdAccounts::UserId).text().not_null())
                    .col(ColumnDef::new(AdAccounts::CredentialId).uuid().not_null())
                    .col(ColumnDef::new(AdAccounts::Name).text().not_null())
                    .col(ColumnDef::new(AdAccounts::Currency).text().null())
                    .col(ColumnDef::new(AdAccounts::Status).text().null())
                    .col(ColumnDef::new(AdAccounts::TimezoneName).text().null())
                    .col(
                        ColumnDef::new(AdAccounts::InitialSyncCompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(timestamp(AdAccounts::CreatedAt))
                    .col(timestamp(AdAccounts::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ad_accounts_credential_id")
                            .from(AdAccounts::Table, AdAccounts::CredentialId)
                            .to(AdCredentials::Table, AdCredentials::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ad_accounts_user_id")
                    .table(AdAccounts::Table)
                    .col(AdAccounts::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Campaigns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Campaigns::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Campaigns::AccountId).text().not_null())
                    .col(ColumnDef::new(Campaigns::Name).text().not_null())
                    .col(ColumnDef::new(Campaigns::Status).text().null())
                    .col(ColumnDef::new(Campaigns::Objective).text().null())
                    .col(ColumnDef::new(Campaigns::BuyingType).text().null())
                    .col(
                        ColumnDef::new(Campaigns::StartTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Campaigns::StopTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(timestamp(Campaigns::CreatedAt))
                    .col(timestamp(Campaigns::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaigns_account_id")
                            .from(Campaigns::Table, Campaigns::AccountId)
                            .to(AdAccounts::Table, AdAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaigns_account_id")
                    .table(Campaigns::Table)
                    .col(Campaigns::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AdSets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AdSets::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(AdSets::AccountId).text().not_null())
                    .col(ColumnDef::new(AdSets::CampaignId).text().null())
                    .col(ColumnDef::new(AdSets::Name).text().not_null())
                    .col(ColumnDef::new(AdSets::Status).text().null())
                    .col(ColumnDef::new(AdSets::OptimizationGoal).text().null())
                    .col(ColumnDef::new(AdSets::DailyBudget).double().null())
                    .col(ColumnDef::new(AdSets::LifetimeBudget).double().null())
                    .col(
                        ColumnDef::new(AdSets::StartTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AdSets::EndTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(timestamp(AdSets::CreatedAt))
                    .col(timestamp(AdSets::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ad_sets_account_id")
                            .from(AdSets::Table, AdSets::AccountId)
                            .to(AdAccounts::Table, AdAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ad_sets_campaign_id")
                            .from(AdSets::Table, AdSets::CampaignId)
                            .to(Campaigns::Table, Campaigns::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ad_sets_account_id")
                    .table(AdSets::Table)
                    .col(AdSets::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Ads::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Ads::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(Ads::AccountId).text().not_null())
                    .col(ColumnDef::new(Ads::CampaignId).text().null())
                    .col(ColumnDef::new(Ads::AdSetId).text().null())
                    .col(ColumnDef::new(Ads::Name).text().not_null())
                    .col(ColumnDef::new(Ads::Status).text().null())
                    .col(ColumnDef::new(Ads::CreativeId).text().null())
                    .col(timestamp(Ads::CreatedAt))
                    .col(timestamp(Ads::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ads_account_id")
                            .from(Ads::Table, Ads::AccountId)
                            .to(AdAccounts::Table, AdAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ads_campaign_id")
                            .from(Ads::Table, Ads::CampaignId)
                            .to(Campaigns::Table, Campaigns::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ads_ad_set_id")
                            .from(Ads::Table, Ads::AdSetId)
                            .to(AdSets::Table, AdSets::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ads_account_id")
                    .table(Ads::Table)
                    .col(Ads::AccountId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Leaves first so foreign keys never dangle
        manager
            .drop_table(Table::drop().table(Ads::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AdSets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Campaigns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AdAccounts::Table).to_owned())
            .await
    }
}

fn timestamp<T: IntoIden>(column: T) -> ColumnDef {
    ColumnDef::new(column)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(DeriveIden)]
enum AdCredentials {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum AdAccounts {
    Table,
    Id,
    UserId,
    CredentialId,
    Name,
    Currency,
    Status,
    TimezoneName,
    InitialSyncCompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
    AccountId,
    Name,
    Status,
    Objective,
    BuyingType,
    StartTime,
    StopTime,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AdSets {
    Table,
    Id,
    AccountId,
    CampaignId,
    Name,
    Status,
    OptimizationGoal,
    DailyBudget,
    LifetimeBudget,
    StartTime,
    EndTime,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Ads {
    Table,
    Id,
    AccountId,
    CampaignId,
    AdSetId,
    Name,
    Status,
    CreativeId,
    CreatedAt,
    UpdatedAt,
}
