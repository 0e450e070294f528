//! Migration to create the ad_credentials table.
//!
//! One row per user holding the encrypted provider token and its validity
//! bookkeeping.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdCredentials::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AdCredentials::UserId).text().not_null())
                    .col(
                        ColumnDef::new(AdCredentials::AccountIds)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdCredentials::AccessTokenCiphertext)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdCredentials::RefreshTokenCiphertext)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AdCredentials::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdCredentials::LastValidatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AdCredentials::RequiresReauth)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AdCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AdCredentials::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_ad_credentials_user_id")
                    .table(AdCredentials::Table)
                    .col(AdCredentials::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ad_credentials_reauth_expires")
                    .table(AdCredentials::Table)
                    .col(AdCredentials::RequiresReauth)
                    .col(AdCredentials::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AdCredentials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AdCredentials {
    Table,
    Id,
    UserId,
    AccountIds,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    ExpiresAt,
    LastValidatedAt,
    RequiresReauth,
    CreatedAt,
    UpdatedAt,
}
