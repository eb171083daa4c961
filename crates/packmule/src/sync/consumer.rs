//! Per-package sync: fetch, enrich, upsert.
//!
//! Handlers are safe to re-run — the queue guarantees at-least-once
//! delivery, so a duplicate job performs an idempotent upsert and (because
//! no version transition is observed twice) no duplicate notification
//! dispatch.

use std::sync::Arc;

use crate::index::{IndexError, PackageDocument, SearchIndex};
use crate::limit::ApiRateLimiter;
use crate::notify::{Dispatcher, UpdateEnrichment, is_major_bump};
use crate::registry::{Packument, RegistryClient, RegistryError};
use crate::retry::RetryConfig;

use super::queue::JobError;

/// What a sync job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The package was (re-)indexed.
    Upserted {
        previous_version: Option<String>,
        version_changed: bool,
    },
    /// The package was removed from the index (deleted, missing upstream,
    /// or no installable versions).
    Deleted,
}

/// Compute the searchable document for a packument.
///
/// Returns `None` when the packument has no usable versions — the
/// unpublished-package shape, which callers treat as an index delete.
#[must_use]
pub fn enrich(packument: &Packument) -> Option<PackageDocument> {
    let latest = packument.latest_version().or_else(|| {
        // No `latest` tag; take the lexically greatest published version
        // rather than dropping the package from search entirely.
        packument.versions.values().last()
    })?;

    Some(PackageDocument {
        name: packument.name.clone(),
        description: packument.description.clone(),
        keywords: packument.keywords.clone(),
        license: packument.license_spdx(),
        latest_version: latest.version.clone(),
        version_count: packument.versions.len(),
        last_publish: packument
            .published_at(&latest.version)
            .or_else(|| packument.modified_at()),
        unpacked_size: latest.unpacked_size(),
        dependency_count: latest.dependencies.len(),
        deprecated: latest.is_deprecated(),
    })
}

/// Handles `PackageSync` jobs.
pub struct SyncHandler {
    client: Arc<RegistryClient>,
    index: Arc<dyn SearchIndex>,
    dispatcher: Option<Arc<Dispatcher>>,
    retry: RetryConfig,
    limiter: Option<ApiRateLimiter>,
}

impl SyncHandler {
    pub fn new(client: Arc<RegistryClient>, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            client,
            index,
            dispatcher: None,
            retry: RetryConfig::default(),
            limiter: None,
        }
    }

    /// Wire in notification dispatch for observed version transitions.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Pace registry fetches (used by backfill drains).
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: ApiRateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Sync one package into the search index.
    pub async fn sync_package(&self, name: &str, deleted: bool) -> Result<SyncOutcome, JobError> {
        if deleted {
            self.delete_from_index(name).await?;
            tracing::debug!(package = name, "Removed deleted package from index");
            return Ok(SyncOutcome::Deleted);
        }

        if let Some(limiter) = &self.limiter {
            limiter.wait().await;
        }

        let packument = self
            .client
            .fetch_packument_with_retry(name, &self.retry)
            .await
            .map_err(map_registry_error)?;

        let Some(packument) = packument else {
            // Permanent upstream condition, not an error: drop the entry
            // instead of retrying forever.
            self.delete_from_index(name).await?;
            tracing::debug!(package = name, "Package gone upstream, removed from index");
            return Ok(SyncOutcome::Deleted);
        };

        let Some(document) = enrich(&packument) else {
            self.delete_from_index(name).await?;
            tracing::debug!(package = name, "No installable versions, removed from index");
            return Ok(SyncOutcome::Deleted);
        };

        let previous = match self.index.get(name).await {
            Ok(previous) => previous,
            Err(err) => {
                // Losing the previous document only costs transition
                // detection for this run; the upsert still proceeds.
                tracing::warn!(package = name, error = %err, "Index lookup failed");
                None
            }
        };

        self.index
            .upsert(&document)
            .await
            .map_err(map_index_error)?;

        let previous_version = previous.map(|doc| doc.latest_version);
        let version_changed = previous_version
            .as_deref()
            .is_some_and(|prev| prev != document.latest_version);

        if version_changed
            && let (Some(dispatcher), Some(prev)) = (&self.dispatcher, previous_version.as_deref())
        {
            let enrichment = UpdateEnrichment {
                is_breaking_change: is_major_bump(Some(prev), &document.latest_version),
                ..UpdateEnrichment::default()
            };
            let dispatched = dispatcher
                .dispatch(name, &enrichment, Some(prev), &document.latest_version)
                .await;
            tracing::info!(
                package = name,
                previous = prev,
                new = %document.latest_version,
                notified = dispatched.notified,
                skipped = dispatched.skipped,
                "Version change dispatched"
            );
        }

        Ok(SyncOutcome::Upserted {
            previous_version,
            version_changed,
        })
    }

    async fn delete_from_index(&self, name: &str) -> Result<(), JobError> {
        self.index.delete(name).await.map_err(map_index_error)
    }
}

fn map_registry_error(err: RegistryError) -> JobError {
    match &err {
        RegistryError::RetriesExhausted { .. } => JobError::Retryable(err.to_string()),
        e if e.is_transient() => JobError::Retryable(err.to_string()),
        _ => JobError::Fatal(err.to_string()),
    }
}

fn map_index_error(err: IndexError) -> JobError {
    match &err {
        IndexError::Transport(_) => JobError::Retryable(err.to_string()),
        IndexError::Api { status, .. } if *status == 429 || *status >= 500 => {
            JobError::Retryable(err.to_string())
        }
        _ => JobError::Fatal(err.to_string()),
    }
}
