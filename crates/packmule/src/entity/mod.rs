//! Database entities.

pub mod backfill_package;
pub mod backfill_state;
pub mod backfill_status;
pub mod chat_integration;
pub mod notification;
pub mod notification_preference;
pub mod package_favorite;
pub mod prelude;
pub mod severity;
pub mod user;
