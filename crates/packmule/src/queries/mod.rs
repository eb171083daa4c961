//! Typed read/write query functions over the entities.
//!
//! The database is a collaborator interface: the sync core consumes these
//! functions and never builds ad-hoc SQL elsewhere.

pub mod backfill;
pub mod errors;
pub mod favorites;
pub mod notifications;

pub use errors::{Result, StoreError};
pub use favorites::FavoriteSubscriber;
