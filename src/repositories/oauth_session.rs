//! # OAuth Session Repository
//!
//! Short-lived storage for the PKCE `state` / `code_verifier` pair issued when
//! a user starts the authorization flow.

use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::models::oauth_session::{ActiveModel, Column, Entity, Model};

/// Repository for OAuth session database operations
#[derive(Clone)]
pub struct OAuthSessionRepository {
    db: DatabaseConnection,
}

impl OAuthSessionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Store a new session for `user_id`, replacing any pending one.
    pub async fn create(
        &self,
        user_id: &str,
        state: &str,
        code_verifier: Option<String>,
        ttl_seconds: u64,
    ) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();
        let ttl = Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX));

        self.delete_for_user(user_id).await?;

        let model = Model {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            state: state.to_string(),
            code_verifier,
            expires_at: now + ttl,
            created_at: now,
        };

        let active = ActiveModel {
            id: Set(model.id),
            user_id: Set(model.user_id.clone()),
            state: Set(model.state.clone()),
            code_verifier: Set(model.code_verifier.clone()),
            expires_at: Set(model.expires_at),
            created_at: Set(model.created_at),
        };

        // Avoids UnpackInsertId on SQLite for non-integer keys
        Entity::insert(active).exec_without_returning(&self.db).await?;

        Ok(model)
    }

    /// Remove every session of `user_id` and return the newest unexpired one.
    ///
    /// The removal happens whether or not a live session existed, so a
    /// state/verifier pair can be presented at most once.
    pub async fn take_for_user(&self, user_id: &str) -> Result<Option<Model>, DbErr> {
        let session = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::ExpiresAt.gt(Utc::now().fixed_offset()))
            .order_by_desc(Column::CreatedAt)
            .one(&self.db)
            .await?;

        self.delete_for_user(user_id).await?;

        Ok(session)
    }

    pub async fn delete_for_user(&self, user_id: &str) -> Result<u64, DbErr> {
        let result = Entity::delete_many()
            .filter(Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Delete sessions whose TTL has elapsed.
    pub async fn purge_expired(&self) -> Result<u64, DbErr> {
        let result = Entity::delete_many()
            .filter(Column::ExpiresAt.lte(Utc::now().fixed_offset()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
