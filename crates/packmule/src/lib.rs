//! Packmule - npm registry sync pipeline.
//!
//! This library keeps a search index and derived package metadata
//! continuously synchronized with the public npm registry, and notifies
//! subscribed users when packages they follow are updated.
//!
//! # Features
//!
//! - `migrate` - Enables database migration support. When enabled, you can
//!   use [`connect_and_migrate`] to automatically run migrations on
//!   connection.
//!
//! # Example
//!
//! ```ignore
//! use packmule::db::connect_and_migrate;
//! use packmule::registry::{ChangeFeed, RegistryClient};
//!
//! let db = connect_and_migrate("sqlite://packmule.db?mode=rwc").await?;
//!
//! // Follow the change feed from a persisted cursor.
//! let feed = ChangeFeed::new(client, last_seq);
//! feed.run(event_tx).await?;
//! ```

pub mod cache;
pub mod db;
pub mod entity;
pub mod http;
pub mod index;
pub mod limit;
pub mod notify;
pub mod queries;
pub mod registry;
pub mod resolve;
pub mod retry;
pub mod sync;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use index::{PackageDocument, SearchIndex};
pub use limit::ApiRateLimiter;
pub use registry::{ChangeEvent, Packument, RegistryClient, RegistryError};
pub use resolve::{InstallSizeReport, SizeResolver};
pub use retry::RetryConfig;
