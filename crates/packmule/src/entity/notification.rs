//! Notification entity - one in-app notification row per user, package
//! and version.
//!
//! Uniqueness invariant: at most one row per `(user_id, package_name,
//! new_version)`, enforced by a unique index so duplicate dispatch
//! attempts collapse into conflict-ignored no-ops. Rows are mutated only
//! by read-state transitions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::severity::Severity;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub package_name: String,

    pub new_version: String,

    pub previous_version: Option<String>,

    pub severity: Severity,

    #[sea_orm(default_value = false)]
    pub is_security_update: bool,

    #[sea_orm(default_value = false)]
    pub is_breaking_change: bool,

    pub changelog_snippet: Option<String>,

    /// Advisory identifiers fixed by this release, as a JSON array.
    #[sea_orm(column_type = "Json")]
    pub vulnerabilities_fixed: Json,

    #[sea_orm(default_value = false)]
    pub read: bool,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
