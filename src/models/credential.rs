//! Credential entity model
//!
//! One row per user holding the encrypted provider access token, the list of
//! reachable ad accounts and the validity bookkeeping the validator mutates.

use chrono::{DateTime, Utc};
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ad_credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user; unique across the table
    #[sea_orm(unique)]
    pub user_id: String,

    /// Cached list of reachable ad account ids (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub account_ids: JsonValue,

    /// Base64 envelope produced by [`crate::crypto::encrypt_token`]
    #[sea_orm(column_type = "Text")]
    pub access_token_ciphertext: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub refresh_token_ciphertext: Option<String>,

    pub expires_at: DateTimeWithTimeZone,

    pub last_validated_at: Option<DateTimeWithTimeZone>,

    /// Once set, the credential must not be used until re-issued
    pub requires_reauth: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ad_account::Entity")]
    AdAccounts,
    #[sea_orm(has_many = "super::sync_job::Entity")]
    SyncJobs,
}

impl Related<super::ad_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdAccounts.def()
    }
}

impl Related<super::sync_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Account ids stored in the `account_ids` JSON array.
    pub fn account_id_list(&self) -> Vec<String> {
        self.account_ids
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `expires_at` lies at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.with_timezone(&Utc) <= now
    }
}
