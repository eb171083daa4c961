//! Breadth-first install-size resolution.
//!
//! Starting from a root package at a requested (or latest) version, the
//! resolver walks the dependency graph level by level against the
//! registry: each level's packuments are fetched with bounded concurrency,
//! each dependency range is resolved to a concrete version, versions whose
//! platform constraints exclude the target are dropped, and results are
//! deduplicated by `name@version` so diamond dependencies count once.
//!
//! The traversal is bounded three ways: an empty frontier, a hard cap on
//! resolved packages, and a wall-clock deadline. Hitting the cap or the
//! deadline downgrades the result to a best-effort partial sum instead of
//! an error. Packument fetches are cached per invocation only; there is no
//! cross-request cache at this layer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout_at};

use crate::registry::types::VersionMeta;
use crate::registry::{Packument, RegistryClient, RegistryError};
use crate::retry::RetryConfig;

use super::platform::TargetPlatform;
use super::spec::{DependencySpec, flatten, parse_spec};
use super::types::{InstallSizeReport, ResolveLimits, ResolvedPackage};

use node_semver::Version;

/// Full traversal result: the report plus every package it covers.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub report: InstallSizeReport,
    pub packages: Vec<ResolvedPackage>,
}

/// Install-size resolver over a registry client.
///
/// A resolver holds no per-request state; callers may issue any number of
/// concurrent `resolve` calls.
pub struct SizeResolver {
    client: Arc<RegistryClient>,
    limits: ResolveLimits,
    platform: TargetPlatform,
    retry: RetryConfig,
}

impl SizeResolver {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self {
            client,
            limits: ResolveLimits::default(),
            platform: TargetPlatform::default(),
            // Request-path fetches get a short retry budget; the overall
            // deadline is the real bound.
            retry: RetryConfig::new(Duration::from_millis(250), Duration::from_secs(2), 2),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ResolveLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: TargetPlatform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve the install size of `name` at `requested` (or latest).
    ///
    /// Returns `Ok(None)` when the package or the requested version does
    /// not exist.
    pub async fn resolve(
        &self,
        name: &str,
        requested: Option<&str>,
    ) -> Result<Option<InstallSizeReport>, RegistryError> {
        Ok(self
            .resolve_tree(name, requested)
            .await?
            .map(|resolution| resolution.report))
    }

    /// Like [`SizeResolver::resolve`] but returns the resolved package set
    /// alongside the report.
    pub async fn resolve_tree(
        &self,
        name: &str,
        requested: Option<&str>,
    ) -> Result<Option<Resolution>, RegistryError> {
        let deadline = Instant::now() + self.limits.timeout;
        let mut cache: HashMap<String, Option<Arc<Packument>>> = HashMap::new();
        let mut partial = false;

        let root = match self
            .client
            .fetch_packument_with_retry(name, &self.retry)
            .await?
        {
            Some(packument) => Arc::new(packument),
            None => return Ok(None),
        };
        cache.insert(name.to_string(), Some(Arc::clone(&root)));

        let Some(root_version) = select_root_version(&root, requested) else {
            return Ok(None);
        };

        let mut visited: HashSet<String> = HashSet::new();
        let mut resolved: Vec<ResolvedPackage> = Vec::new();
        let mut seen_edges: HashSet<(String, String)> = HashSet::new();

        visited.insert(format!("{name}@{}", root_version.version));
        resolved.push(ResolvedPackage {
            name: name.to_string(),
            version: root_version.version.clone(),
            unpacked_size: root_version.unpacked_size(),
        });

        let mut frontier: Vec<(String, DependencySpec)> = Vec::new();
        push_dependencies(root_version, &mut seen_edges, &mut frontier);

        'levels: while !frontier.is_empty() {
            if resolved.len() >= self.limits.max_packages || Instant::now() >= deadline {
                partial = true;
                break;
            }

            let missing: Vec<String> = {
                let mut unique: HashSet<&String> = HashSet::new();
                frontier
                    .iter()
                    .map(|(fetch_name, _)| fetch_name)
                    .filter(|fetch_name| !cache.contains_key(*fetch_name))
                    .filter(|fetch_name| unique.insert(*fetch_name))
                    .cloned()
                    .collect()
            };

            if self.fetch_level(missing, &mut cache, deadline).await {
                partial = true;
            }

            let mut next: Vec<(String, DependencySpec)> = Vec::new();
            for (fetch_name, spec) in frontier {
                // Unavailable packuments (missing upstream or fetch failed)
                // contribute zero size; the branch simply ends here.
                let Some(Some(packument)) = cache.get(&fetch_name) else {
                    continue;
                };
                let Some(version) = self.select_version(packument, &spec) else {
                    continue;
                };

                let key = format!("{fetch_name}@{}", version.version);
                if !visited.insert(key) {
                    continue;
                }

                if resolved.len() >= self.limits.max_packages {
                    partial = true;
                    break 'levels;
                }

                resolved.push(ResolvedPackage {
                    name: fetch_name.clone(),
                    version: version.version.clone(),
                    unpacked_size: version.unpacked_size(),
                });
                push_dependencies(version, &mut seen_edges, &mut next);
            }

            frontier = next;
        }

        let total_size = resolved.iter().map(|pkg| pkg.unpacked_size).sum();
        let report = InstallSizeReport {
            self_size: resolved
                .first()
                .map(|pkg| pkg.unpacked_size)
                .unwrap_or_default(),
            total_size,
            dependency_count: resolved.len().saturating_sub(1),
            partial,
        };

        tracing::debug!(
            package = name,
            resolved = resolved.len(),
            total_size,
            partial,
            "Install size resolved"
        );

        Ok(Some(Resolution {
            report,
            packages: resolved,
        }))
    }

    /// Fetch all `names` concurrently into the cache, bounded by the level
    /// concurrency limit and the deadline.
    ///
    /// Returns true when the result is degraded: the deadline cut fetches
    /// short, or a fetch exhausted its retry budget.
    async fn fetch_level(
        &self,
        names: Vec<String>,
        cache: &mut HashMap<String, Option<Arc<Packument>>>,
        deadline: Instant,
    ) -> bool {
        if names.is_empty() {
            return false;
        }

        let semaphore = Arc::new(Semaphore::new(self.limits.fetch_concurrency.max(1)));
        let mut handles = Vec::with_capacity(names.len());

        for fetch_name in names {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let retry = self.retry.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            fetch_name,
                            Err(RegistryError::internal("semaphore closed unexpectedly")),
                        );
                    }
                };
                let result = client.fetch_packument_with_retry(&fetch_name, &retry).await;
                (fetch_name, result)
            });

            handles.push(handle);
        }

        let mut degraded = false;
        let mut timed_out = false;

        for mut handle in handles {
            if timed_out {
                handle.abort();
                continue;
            }

            match timeout_at(deadline, &mut handle).await {
                Ok(Ok((fetch_name, Ok(packument)))) => {
                    cache.insert(fetch_name, packument.map(Arc::new));
                }
                Ok(Ok((fetch_name, Err(err)))) => {
                    tracing::warn!(
                        package = %fetch_name,
                        error = %err,
                        "Dependency fetch failed, counting zero size"
                    );
                    cache.insert(fetch_name, None);
                    degraded = true;
                }
                Ok(Err(join_err)) => {
                    tracing::warn!(error = %join_err, "Dependency fetch task failed");
                    degraded = true;
                }
                Err(_elapsed) => {
                    handle.abort();
                    timed_out = true;
                }
            }
        }

        degraded || timed_out
    }

    /// Resolve a spec against a packument's published versions, preferring
    /// the highest satisfying version that installs on the target platform.
    fn select_version<'a>(
        &self,
        packument: &'a Packument,
        spec: &DependencySpec,
    ) -> Option<&'a VersionMeta> {
        match spec {
            DependencySpec::Exact(version) => {
                let meta = packument.versions.get(&version.to_string())?;
                self.platform
                    .allows(&meta.os, &meta.cpu, &meta.libc)
                    .then_some(meta)
            }
            DependencySpec::Range(range) => {
                let mut best: Option<(Version, &VersionMeta)> = None;
                for (raw, meta) in &packument.versions {
                    let Ok(version) = raw.parse::<Version>() else {
                        continue;
                    };
                    if !range.satisfies(&version) {
                        continue;
                    }
                    if !self.platform.allows(&meta.os, &meta.cpu, &meta.libc) {
                        continue;
                    }
                    if best.as_ref().is_none_or(|(current, _)| version > *current) {
                        best = Some((version, meta));
                    }
                }
                best.map(|(_, meta)| meta)
            }
            // Aliases are flattened before they reach the frontier.
            DependencySpec::Alias { .. } | DependencySpec::Unresolvable => None,
        }
    }
}

/// Pick the root version: an exact version string, a range, or `latest`.
///
/// Platform constraints are not applied to the root — the question being
/// answered is about the package itself.
fn select_root_version<'a>(
    packument: &'a Packument,
    requested: Option<&str>,
) -> Option<&'a VersionMeta> {
    match requested {
        Some(requested) => {
            if let Some(meta) = packument.versions.get(requested) {
                return Some(meta);
            }
            match parse_spec(requested) {
                DependencySpec::Range(range) => {
                    let mut best: Option<(Version, &VersionMeta)> = None;
                    for (raw, meta) in &packument.versions {
                        let Ok(version) = raw.parse::<Version>() else {
                            continue;
                        };
                        if !range.satisfies(&version) {
                            continue;
                        }
                        if best.as_ref().is_none_or(|(current, _)| version > *current) {
                            best = Some((version, meta));
                        }
                    }
                    best.map(|(_, meta)| meta)
                }
                _ => None,
            }
        }
        None => packument.latest_version().or_else(|| {
            // No `latest` tag; fall back to the highest published version.
            let mut best: Option<(Version, &VersionMeta)> = None;
            for (raw, meta) in &packument.versions {
                let Ok(version) = raw.parse::<Version>() else {
                    continue;
                };
                if best.as_ref().is_none_or(|(current, _)| version > *current) {
                    best = Some((version, meta));
                }
            }
            best.map(|(_, meta)| meta)
        }),
    }
}

/// Expand a version's install dependencies into frontier entries, skipping
/// unresolvable specifiers and edges already queued this run.
fn push_dependencies(
    version: &VersionMeta,
    seen_edges: &mut HashSet<(String, String)>,
    frontier: &mut Vec<(String, DependencySpec)>,
) {
    for (dep_name, raw_spec) in version.install_dependencies() {
        let Some((fetch_name, spec)) = flatten(dep_name, parse_spec(raw_spec)) else {
            continue;
        };
        if seen_edges.insert((fetch_name.clone(), raw_spec.clone())) {
            frontier.push((fetch_name, spec));
        }
    }
}
