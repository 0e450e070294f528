//! Insight entity model
//!
//! Daily performance fact for one campaign, ad set or ad. Unique on
//! `(account_id, entity_id, level, date)`; every sync overwrites the row.

use chrono::NaiveDate;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use uuid::Uuid;

use super::InsightLevel;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ad_insights")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub account_id: String,

    /// Id of the campaign, ad set or ad the row describes
    pub entity_id: String,

    /// `CAMPAIGN`, `ADSET` or `AD`
    pub level: String,

    pub date: NaiveDate,

    #[sea_orm(column_type = "Double")]
    pub spend: f64,

    pub impressions: i64,

    pub clicks: i64,

    #[sea_orm(column_type = "Double", nullable)]
    pub cpa: Option<f64>,

    #[sea_orm(column_type = "Double", nullable)]
    pub roas: Option<f64>,

    #[sea_orm(column_type = "Double", nullable)]
    pub purchase_value: Option<f64>,

    pub currency: Option<String>,

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
}

impl Related<super::ad_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn insight_level(&self) -> Option<InsightLevel> {
        self.level.parse().ok()
    }
}
