//! NotificationPreference entity - per-user flags controlling which
//! updates are notified and on which channels.
//!
//! A user without a row gets the documented defaults; a missing record
//! must never collapse into "notify nothing" (see
//! [`crate::notify::Preferences::from_model`]).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_preferences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,

    /// Notify on every update, regardless of severity.
    #[sea_orm(default_value = false)]
    pub notify_all_updates: bool,

    /// Notify on non-info severity updates.
    #[sea_orm(default_value = true)]
    pub notify_major_only: bool,

    /// Notify on security updates regardless of severity.
    #[sea_orm(default_value = true)]
    pub notify_security_only: bool,

    /// Write in-app notification rows.
    #[sea_orm(default_value = true)]
    pub in_app_enabled: bool,

    /// Send an immediate email for critical updates.
    #[sea_orm(default_value = true)]
    pub email_immediate_critical: bool,

    /// Batch non-critical email into a digest (delivery is a collaborator).
    #[sea_orm(default_value = false)]
    pub email_digest: bool,
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
