//! Dependency-tree install-size resolution.
//!
//! Invoked on demand from the request path, independent of the sync
//! pipeline, but sharing the registry-fetch discipline (transport trait,
//! typed fetch outcomes, bounded retries).

pub mod platform;
pub mod resolver;
pub mod spec;
pub mod types;

pub use platform::TargetPlatform;
pub use resolver::{Resolution, SizeResolver};
pub use spec::{DependencySpec, parse_spec};
pub use types::{InstallSizeReport, ResolveLimits, ResolvedPackage};
