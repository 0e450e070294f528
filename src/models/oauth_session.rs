//! # OAuth Session Model
//!
//! Server-side storage for the PKCE `state` and `code_verifier` issued when an
//! authorization flow starts. Rows live for at most ten minutes and are
//! consumed by the callback.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// User that started the flow
    pub user_id: String,

    /// State token generated for CSRF protection
    #[sea_orm(column_type = "Text")]
    pub state: String,

    /// PKCE code verifier
    #[sea_orm(column_type = "Text", nullable)]
    pub code_verifier: Option<String>,

    pub expires_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
