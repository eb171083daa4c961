//! Update notifications: severity classification, preference filtering,
//! dispatch fan-out and channel delivery.
//!
//! # Module structure
//!
//! - [`types`] - `Severity` re-export, `UpdateEnrichment`, `DispatchResult`
//! - [`severity`] - update classification rules
//! - [`preferences`] - per-user flags with missing-record defaults
//! - [`dispatcher`] - the fan-out over favorites and delivery queues
//! - [`delivery`] - chat webhook and email delivery workers

pub mod delivery;
pub mod dispatcher;
pub mod preferences;
pub mod severity;
pub mod types;

pub use delivery::{DeliveryWorker, EmailSender, LogEmailSender};
pub use dispatcher::Dispatcher;
pub use preferences::Preferences;
pub use severity::{classify_update, is_major_bump};
pub use types::{DispatchResult, Severity, UpdateEnrichment};
