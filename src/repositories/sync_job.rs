//! # SyncJob Repository
//!
//! Persistence for the audit row written around every sync invocation.
//! Terminal transitions only apply to jobs that are still RUNNING, so a job
//! reaches SUCCESS or FAILED at most once.

use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, sea_query::Expr,
};
use serde_json::Value as JsonValue;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::SyncJobStatus;
use crate::models::sync_job::{ActiveModel, Column, Entity, Model};

/// Repository for sync job database operations
#[derive(Clone)]
pub struct SyncJobRepository {
    db: DatabaseConnection,
}

impl SyncJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a job in RUNNING state.
    pub async fn create_running(&self, user_id: &str, credential_id: Uuid) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();

        let model = Model {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            credential_id,
            status: SyncJobStatus::Running.as_str().to_string(),
            started_at: now,
            finished_at: None,
            error_payload: None,
            created_at: now,
            updated_at: now,
        };

        let active = ActiveModel {
            id: Set(model.id),
            user_id: Set(model.user_id.clone()),
            credential_id: Set(model.credential_id),
            status: Set(model.status.clone()),
            started_at: Set(model.started_at),
            finished_at: Set(None),
            error_payload: Set(None),
            created_at: Set(model.created_at),
            updated_at: Set(model.updated_at),
        };

        Entity::insert(active)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                error!(user_id = %user_id, "Failed to create sync job: {}", e);
                e
            })?;

        info!(user_id = %user_id, job_id = %model.id, "Sync job started");

        Ok(model)
    }

    pub async fn mark_succeeded(&self, job_id: Uuid) -> Result<(), DbErr> {
        self.finish(job_id, SyncJobStatus::Success, None).await
    }

    pub async fn mark_failed(&self, job_id: Uuid, payload: JsonValue) -> Result<(), DbErr> {
        self.finish(job_id, SyncJobStatus::Failed, Some(payload)).await
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: SyncJobStatus,
        payload: Option<JsonValue>,
    ) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();

        let mut update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(status.as_str()))
            .col_expr(Column::FinishedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        if let Some(payload) = payload {
            update = update.col_expr(Column::ErrorPayload, Expr::value(payload));
        }

        let result = update
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(SyncJobStatus::Running.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(DbErr::RecordNotUpdated);
        }

        info!(job_id = %job_id, status = %status, "Sync job finished");
        Ok(())
    }

    pub async fn find(&self, job_id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(job_id).one(&self.db).await
    }

    /// Most recent jobs for a user, newest first.
    pub async fn list_by_user(&self, user_id: &str, limit: u64) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::StartedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }
}
