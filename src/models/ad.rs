//! Ad entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    pub account_id: String,

    pub campaign_id: Option<String>,

    pub ad_set_id: Option<String>,

    pub name: String,

    pub status: Option<String>,

    pub creative_id: Option<String>,

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
        belongs_to = "super::ad_set::Entity",
        from = "Column::AdSetId",
        to = "super::ad_set::Column::Id"
    )]
    AdSet,
}

impl Related<super::ad_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdAccount.def()
    }
}

impl Related<super::ad_set::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AdSet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
