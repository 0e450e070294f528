//! # Credential Repository
//!
//! Credential Store Adapter: one row per user, superseded by upsert and never
//! hard-deleted.

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
    sea_query::{Expr, OnConflict},
};
use serde_json::json;
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::credential::{ActiveModel, Column, Entity, Model};

/// Values written when a user (re-)authorizes.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub user_id: String,
    pub account_ids: Vec<String>,
    pub access_token_ciphertext: String,
    pub refresh_token_ciphertext: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Repository for credential database operations
#[derive(Clone)]
pub struct CredentialRepository {
    db: DatabaseConnection,
}

impl CredentialRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or replace the user's credential, keyed by `user_id`.
    ///
    /// A re-issued credential starts validated and clears `requires_reauth`;
    /// the row id is preserved so accounts and jobs keep their reference.
    /// A stored refresh token survives re-authorization without a new one.
    pub async fn upsert_for_user(&self, new: NewCredential) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();

        let mut update_columns = vec![
            Column::AccountIds,
            Column::AccessTokenCiphertext,
            Column::ExpiresAt,
            Column::LastValidatedAt,
            Column::RequiresReauth,
            Column::UpdatedAt,
        ];
        if new.refresh_token_ciphertext.is_some() {
            update_columns.push(Column::RefreshTokenCiphertext);
        }

        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(new.user_id.clone()),
            account_ids: Set(json!(new.account_ids)),
            access_token_ciphertext: Set(new.access_token_ciphertext),
            refresh_token_ciphertext: Set(new.refresh_token_ciphertext),
            expires_at: Set(new.expires_at.fixed_offset()),
            last_validated_at: Set(Some(now)),
            requires_reauth: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::UserId)
                    .update_columns(update_columns)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                error!(user_id = %new.user_id, "Failed to upsert credential: {}", e);
                e
            })?;

        self.find_by_user(&new.user_id)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("credential for user {}", new.user_id)))
    }

    pub async fn find_by_user(&self, user_id: &str) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(&self.db).await
    }

    /// Flag the credential as unusable until re-issued.
    pub async fn mark_requires_reauth(&self, id: Uuid) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(Column::RequiresReauth, Expr::value(true))
            .col_expr(Column::LastValidatedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        debug!(credential_id = %id, rows = result.rows_affected, "Credential marked for re-authorization");
        Ok(())
    }

    /// Record a successful provider validation, optionally revising the expiry.
    pub async fn record_validation(
        &self,
        id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();

        let mut update = Entity::update_many()
            .col_expr(Column::RequiresReauth, Expr::value(false))
            .col_expr(Column::LastValidatedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        if let Some(expires_at) = expires_at {
            update = update.col_expr(Column::ExpiresAt, Expr::value(expires_at.fixed_offset()));
        }

        update.filter(Column::Id.eq(id)).exec(&self.db).await?;
        Ok(())
    }

    /// Usable credentials, least recently validated first.
    pub async fn list_eligible_for_refresh(&self, now: DateTime<Utc>) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::RequiresReauth.eq(false))
            .filter(Column::ExpiresAt.gt(now.fixed_offset()))
            .order_by_asc(Column::LastValidatedAt)
            .order_by_asc(Column::UserId)
            .all(&self.db)
            .await
    }

    /// Credentials flagged for re-authorization or already past expiry.
    pub async fn count_requiring_reauth(&self, now: DateTime<Utc>) -> Result<u64, DbErr> {
        Entity::find()
            .filter(
                Condition::any()
                    .add(Column::RequiresReauth.eq(true))
                    .add(Column::ExpiresAt.lte(now.fixed_offset())),
            )
            .count(&self.db)
            .await
    }
}
