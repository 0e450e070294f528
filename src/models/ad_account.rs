//! AdAccount entity model
//!
//! Provider ad accounts reachable by a credential. The primary key is the
//! provider-assigned id (`act_<number>`).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ad_accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Credential the account was discovered through
    pub credential_id: Uuid,

    pub name: String,

    pub currency: Option<String>,

    /// Provider account status code rendered as a string
    pub status: Option<String>,

    pub timezone_name: Option<String>,

    /// Stamped only by syncs flagged as the initial sync
    pub initial_sync_completed_at: Option<DateTimeWithTimeZone>,

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
    #[sea_orm(has_many = "super::campaign::Entity")]
    Campaigns,
    #[sea_orm(has_many = "super::ad_set::Entity")]
    AdSets,
    #[sea_orm(has_many = "super::ad::Entity")]
    Ads,
    #[sea_orm(has_many = "super::insight::Entity")]
    Insights,
}

impl Related<super::credential::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Credential.def()
    }
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaigns.def()
    }
}

impl Related<super::ad_set::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdSets.def()
    }
}

impl Related<super::ad::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ads.def()
    }
}

impl Related<super::insight::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Insights.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
