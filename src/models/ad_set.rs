//! AdSet entity model
//!
//! `campaign_id` is nullable: ad sets whose campaign the provider did not
//! return are stored unlinked.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ad_sets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    pub account_id: String,

    pub campaign_id: Option<String>,

    pub name: String,

    pub status: Option<String>,

    pub optimization_goal: Option<String>,

    /// Budget in the account's minor currency unit, as reported
    #[sea_orm(column_type = "Double", nullable)]
    pub daily_budget: Option<f64>,

    #[sea_orm(column_type = "Double", nullable)]
    pub lifetime_budget: Option<f64>,

    pub start_time: Option<DateTimeWithTimeZone>,

    pub end_time: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ad_account::Entity",
        from = "Column::AccountId",
        to = "super::ad_account::Column::Id"
    )]
    AdAccount,
    #[sea_orm(
        belongs_to = "super::campaign::Entity",
        from = "Column::CampaignId",
        to = "super::campaign::Column::Id"
    )]
    Campaign,
    #[sea_orm(has_many = "super::ad::Entity")]
    Ads,
}

impl Related<super::ad_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdAccount.def()
    }
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl Related<super::ad::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ads.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
