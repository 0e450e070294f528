//! SyncJob entity model
//!
//! This module contains the SeaORM entity model for the sync_jobs table,
//! one audit row per synchronization attempt.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::SyncJobStatus;

/// SyncJob entity recording the outcome of one sync invocation
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// User the sync ran for
    pub user_id: String,

    /// Credential whose token the sync used
    pub credential_id: Uuid,

    /// One of PENDING, RUNNING, SUCCESS, FAILED
    pub status: String,

    /// Timestamp when the job started execution
    pub started_at: DateTimeWithTimeZone,

    /// Set exactly once, on the terminal transition
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Structured error details if the job failed
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub error_payload: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::credential::Entity",
        from = "Column::CredentialId",
        to = "super::credential::Column::Id"
    )]
    Credential,
}

impl Related<super::credential::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Credential.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn job_status(&self) -> Option<SyncJobStatus> {
        self.status.parse().ok()
    }
}
