//! HTTP client for the package registry.
//!
//! All I/O goes through the [`HttpTransport`] trait so the client is fully
//! testable without sockets. Every fetch returns a [`FetchOutcome`] — the
//! transient/permanent split is decided here, once, from the transport
//! result and status code; callers build retry policy on top of it.

use std::sync::Arc;

use backon::Retryable;
use serde::de::DeserializeOwned;

use crate::http::{HttpRequest, HttpTransport};
use crate::retry::RetryConfig;

use super::error::{FetchOutcome, RegistryError, Result};
use super::types::{AllDocsPage, ChangesPage, Packument};

/// Default public registry endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Default change-feed endpoint (the replicated CouchDB instance).
pub const DEFAULT_FEED_URL: &str = "https://replicate.npmjs.com/registry";

/// Client for packument fetches, the change feed and the full listing.
#[derive(Clone)]
pub struct RegistryClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    feed_url: String,
}

impl RegistryClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        let base_url = trim_trailing_slash(base_url.into());
        let feed_url = base_url.clone();
        Self {
            transport,
            base_url,
            feed_url,
        }
    }

    /// Use a separate host for the change feed (the public registry serves
    /// `_changes` from its replication endpoint, not the main API host).
    #[must_use]
    pub fn with_feed_url(mut self, feed_url: impl Into<String>) -> Self {
        self.feed_url = trim_trailing_slash(feed_url.into());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the packument for `name`. One attempt, no retries.
    pub async fn fetch_packument(&self, name: &str) -> FetchOutcome<Packument> {
        let url = format!("{}/{}", self.base_url, encode_name(name));
        self.get_json(&url, name).await
    }

    /// Fetch the packument for `name`, retrying transient failures with
    /// exponential backoff.
    ///
    /// Returns `Ok(None)` when the package does not exist — a normal
    /// outcome, never retried. Any other permanent failure, or a transient
    /// failure outliving the retry budget, is returned as an error.
    pub async fn fetch_packument_with_retry(
        &self,
        name: &str,
        retry: &RetryConfig,
    ) -> Result<Option<Packument>> {
        let op = || async { self.fetch_packument(name).await.into_result() };

        let result = op
            .retry(retry.clone().into_backoff())
            .when(RegistryError::is_transient)
            .notify(|err: &RegistryError, dur| {
                tracing::debug!(
                    package = name,
                    retry_in_ms = dur.as_millis() as u64,
                    error = %err,
                    "Transient registry failure, retrying"
                );
            })
            .await;

        match result {
            Ok(packument) => Ok(Some(packument)),
            Err(RegistryError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Fetch one page of the change feed after `since`.
    pub async fn fetch_changes(&self, since: u64, limit: usize) -> FetchOutcome<ChangesPage> {
        let url = format!(
            "{}/_changes?feed=normal&since={}&limit={}",
            self.feed_url, since, limit
        );
        self.get_json(&url, "_changes").await
    }

    /// Fetch one page of the full package listing.
    ///
    /// Keyset pagination: `start_key` is the last id of the previous page
    /// and is included in the response again (the boundary row), which the
    /// lister drops.
    pub async fn fetch_all_docs(
        &self,
        start_key: Option<&str>,
        limit: usize,
    ) -> FetchOutcome<AllDocsPage> {
        let url = match start_key {
            Some(key) => format!(
                "{}/_all_docs?limit={}&startkey=%22{}%22",
                self.base_url,
                limit,
                encode_name(key)
            ),
            None => format!("{}/_all_docs?limit={}", self.base_url, limit),
        };
        self.get_json(&url, "_all_docs").await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, resource: &str) -> FetchOutcome<T> {
        let response = match self.transport.send(HttpRequest::get(url)).await {
            Ok(response) => response,
            Err(err) => {
                return FetchOutcome::Transient(RegistryError::network(err.to_string()));
            }
        };

        match response.status {
            status if (200..300).contains(&status) => {
                match serde_json::from_slice::<T>(&response.body) {
                    Ok(value) => FetchOutcome::Success(value),
                    Err(err) => FetchOutcome::Permanent(RegistryError::decode(format!(
                        "{resource}: {err}"
                    ))),
                }
            }
            404 => FetchOutcome::Permanent(RegistryError::not_found(resource)),
            status => FetchOutcome::from_error(RegistryError::api(
                status,
                String::from_utf8_lossy(&response.body)
                    .chars()
                    .take(200)
                    .collect::<String>(),
            )),
        }
    }
}

/// Percent-encode a package name for use in a URL path.
///
/// Scoped names contain a `/` that must be encoded (`@scope/pkg` →
/// `@scope%2Fpkg`); everything else in a valid package name is URL-safe.
#[must_use]
pub fn encode_name(name: &str) -> String {
    name.replace('/', "%2F")
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
