//! Campaign entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "campaigns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    pub account_id: String,

    pub name: String,

    pub status: Option<String>,

    pub objective: Option<String>,

    pub buying_type: Option<String>,

    pub start_time: Option<DateTimeWithTimeZone>,

    pub stop_time: Option<DateTimeWithTimeZone>,

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
    #[sea_orm(has_many = "super::ad_set::Entity")]
    AdSets,
}

impl Related<super::ad_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdAccount.def()
    }
}

impl Related<super::ad_set::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdSets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
