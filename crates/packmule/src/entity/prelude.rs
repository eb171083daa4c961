//! Re-exports of all entity types for convenient importing.

pub use super::backfill_package::Entity as BackfillPackage;
pub use super::backfill_state::Entity as BackfillState;
pub use super::backfill_status::BackfillStatus;
pub use super::chat_integration::Entity as ChatIntegration;
pub use super::notification::Entity as Notification;
pub use super::notification_preference::Entity as NotificationPreference;
pub use super::package_favorite::Entity as PackageFavorite;
pub use super::severity::Severity;
pub use super::user::Entity as User;
