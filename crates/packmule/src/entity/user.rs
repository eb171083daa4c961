//! User entity - the accounts that favorite packages and receive
//! notifications. Account management itself is a collaborator; the sync
//! core only reads these rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub username: String,

    pub email: Option<String>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::package_favorite::Entity")]
    PackageFavorite,
    #[sea_orm(has_many = "super::notification::Entity")]
    Notification,
}

impl Related<super::package_favorite::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PackageFavorite.def()
    }
}

impl Related<super::notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notification.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
