//! Migration to create the oauth_sessions table.
//!
//! Holds the short-lived PKCE state and code verifier between the
//! authorization redirect and the callback.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthSessions::UserId).text().not_null())
                    .col(ColumnDef::new(OAuthSessions::State).text().not_null())
                    .col(ColumnDef::new(OAuthSessions::CodeVerifier).text().null())
                    .col(
                        ColumnDef::new(OAuthSessions::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthSessions::CreatedAt)
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
                    .name("idx_oauth_sessions_user_expires")
                    .table(OAuthSessions::Table)
                    .col(OAuthSessions::UserId)
                    .col(OAuthSessions::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OAuthSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OAuthSessions {
    #[sea_orm(iden = "oauth_sessions")]
    Table,
    Id,
    UserId,
    State,
    CodeVerifier,
    ExpiresAt,
    CreatedAt,
}
