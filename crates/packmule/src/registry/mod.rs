//! Package registry collaborator: packument fetches, the change feed and
//! the full listing.
//!
//! # Module structure
//!
//! - [`types`] - Wire types: `Packument`, `VersionMeta`, `ChangeEvent`
//! - [`error`] - `RegistryError` and the `FetchOutcome` retry split
//! - [`client`] - `RegistryClient`, the transport-backed HTTP client
//! - [`changes`] - `ChangeFeed`, the cursor-driven change-log follower
//! - [`listing`] - `PackageListing`, the keyset-paginated backfill lister

pub mod changes;
pub mod client;
pub mod error;
pub mod listing;
pub mod types;

pub use changes::{ChangeFeed, FeedBackoff};
pub use client::{DEFAULT_FEED_URL, DEFAULT_REGISTRY_URL, RegistryClient, encode_name};
pub use error::{FetchOutcome, RegistryError, Result};
pub use listing::{DEFAULT_PAGE_SIZE, PackageBatch, PackageListing};
pub use types::{ChangeEvent, DistInfo, Packument, VersionMeta, is_internal_id};
