//! Result and configuration types for install-size resolution.

use std::time::Duration;

use serde::Serialize;

/// One package resolved during traversal, deduplicated by `name@version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub unpacked_size: u64,
}

impl ResolvedPackage {
    /// The dedup key for diamond dependencies.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Aggregated install-size result for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallSizeReport {
    /// The root package's own unpacked size in bytes.
    pub self_size: u64,
    /// Sum of unpacked sizes over all resolved packages, root included.
    pub total_size: u64,
    /// Distinct `name@version` pairs resolved, excluding the root.
    pub dependency_count: usize,
    /// True when the traversal hit the package cap or the deadline and the
    /// sums are a best-effort lower bound.
    pub partial: bool,
}

/// Bounds on a single resolution.
#[derive(Debug, Clone)]
pub struct ResolveLimits {
    /// Hard cap on distinct packages resolved before truncating.
    pub max_packages: usize,
    /// Wall-clock budget for the whole traversal.
    pub timeout: Duration,
    /// Concurrent packument fetches per BFS level.
    pub fetch_concurrency: usize,
}

impl Default for ResolveLimits {
    fn default() -> Self {
        Self {
            max_packages: 500,
            timeout: Duration::from_secs(15),
            fetch_concurrency: 20,
        }
    }
}
