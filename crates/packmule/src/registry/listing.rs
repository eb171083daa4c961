//! Full-registry package lister for the cold-start backfill.
//!
//! The listing endpoint is keyset-paginated: each page starts at the last
//! id of the previous page, so consecutive pages share a boundary row that
//! must be dropped. [`PackageListing`] is a pull-based producer — callers
//! ask for the next batch, so downstream queuing starts before the listing
//! finishes and control flow stays explicit and testable.

use super::client::RegistryClient;
use super::error::{FetchOutcome, Result};
use super::types::is_internal_id;

/// Default listing page size.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// One page worth of package names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageBatch {
    /// Package names on this page, internal entries filtered out.
    pub names: Vec<String>,
    /// Running count of names produced so far, this batch included.
    pub cumulative: u64,
    /// Upstream's estimate of the total row count (includes internal rows,
    /// so it is an upper bound, not an exact target).
    pub estimated_total: u64,
}

/// Pull-based producer over the full package listing.
///
/// Exhausted after the first short page. Any page fetch failure is fatal
/// to the whole listing — there is no partial-result fallback; the caller
/// decides whether to restart from scratch.
pub struct PackageListing {
    client: RegistryClient,
    page_size: usize,
    last_key: Option<String>,
    cumulative: u64,
    done: bool,
}

impl PackageListing {
    pub fn new(client: RegistryClient) -> Self {
        Self::with_page_size(client, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(client: RegistryClient, page_size: usize) -> Self {
        Self {
            client,
            page_size: page_size.max(2),
            last_key: None,
            cumulative: 0,
            done: false,
        }
    }

    /// Number of names produced so far.
    #[must_use]
    pub fn cumulative(&self) -> u64 {
        self.cumulative
    }

    /// Fetch the next batch of package names.
    ///
    /// Returns `Ok(None)` once the listing is exhausted. Pages whose rows
    /// are entirely internal entries are skipped transparently.
    pub async fn next_batch(&mut self) -> Result<Option<PackageBatch>> {
        loop {
            if self.done {
                return Ok(None);
            }

            let page = match self
                .client
                .fetch_all_docs(self.last_key.as_deref(), self.page_size)
                .await
            {
                FetchOutcome::Success(page) => page,
                // Fatal either way: a transient failure here is retried by
                // restarting the listing, not by resuming mid-page.
                FetchOutcome::Transient(err) | FetchOutcome::Permanent(err) => {
                    tracing::error!(
                        start_key = self.last_key.as_deref().unwrap_or("<start>"),
                        error = %err,
                        "Package listing page fetch failed"
                    );
                    return Err(err);
                }
            };

            let fetched = page.rows.len();
            self.done = fetched < self.page_size;

            let mut rows = page.rows;

            // Keyset pagination re-returns the start key as the first row.
            if let Some(last_key) = &self.last_key
                && rows.first().is_some_and(|row| &row.id == last_key)
            {
                rows.remove(0);
            }

            // Advance the key before filtering so internal rows at a page
            // boundary cannot stall pagination.
            if let Some(last) = rows.last() {
                self.last_key = Some(last.id.clone());
            }

            let names: Vec<String> = rows
                .into_iter()
                .map(|row| row.id)
                .filter(|id| !is_internal_id(id))
                .collect();

            if names.is_empty() && !self.done {
                continue;
            }

            if names.is_empty() {
                return Ok(None);
            }

            self.cumulative += names.len() as u64;
            return Ok(Some(PackageBatch {
                names,
                cumulative: self.cumulative,
                estimated_total: page.total_rows,
            }));
        }
    }

    /// Drain the whole listing into memory.
    ///
    /// Convenience for small registries and tests; the backfill
    /// orchestrator pulls batch by batch instead.
    pub async fn collect_all(mut self) -> Result<Vec<String>> {
        let mut all = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            all.extend(batch.names);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport};
    use std::sync::Arc;

    fn listing(transport: &MockTransport, page_size: usize) -> PackageListing {
        let client = RegistryClient::new(Arc::new(transport.clone()), "https://reg.test");
        PackageListing::with_page_size(client, page_size)
    }

    fn page(rows: &[&str], total: u64) -> serde_json::Value {
        serde_json::json!({
            "total_rows": total,
            "rows": rows.iter().map(|id| serde_json::json!({ "id": id })).collect::<Vec<_>>()
        })
    }

    fn first_url(limit: usize) -> String {
        format!("https://reg.test/_all_docs?limit={limit}")
    }

    fn keyed_url(limit: usize, key: &str) -> String {
        format!("https://reg.test/_all_docs?limit={limit}&startkey=%22{key}%22")
    }

    #[tokio::test]
    async fn single_short_page_terminates_listing() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, first_url(4), &page(&["a", "b", "c"], 3));

        let mut listing = listing(&transport, 4);
        let batch = listing.next_batch().await.unwrap().expect("one batch");
        assert_eq!(batch.names, vec!["a", "b", "c"]);
        assert_eq!(batch.cumulative, 3);
        assert_eq!(batch.estimated_total, 3);

        assert!(listing.next_batch().await.unwrap().is_none());
        // Exhausted listings stay exhausted without refetching.
        assert!(listing.next_batch().await.unwrap().is_none());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn boundary_row_is_deduplicated_across_pages() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, first_url(3), &page(&["a", "b", "c"], 5));
        transport.push_json(
            HttpMethod::Get,
            keyed_url(3, "c"),
            &page(&["c", "d", "e"], 5),
        );
        transport.push_json(HttpMethod::Get, keyed_url(3, "e"), &page(&["e"], 5));

        let names = listing(&transport, 3).collect_all().await.unwrap();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn internal_entries_are_filtered_but_do_not_stall_pagination() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            first_url(3),
            &page(&["_design/app", "_design/scratch", "_replicator"], 6),
        );
        transport.push_json(
            HttpMethod::Get,
            keyed_url(3, "_replicator"),
            &page(&["_replicator", "a", "b"], 6),
        );
        transport.push_json(HttpMethod::Get, keyed_url(3, "b"), &page(&["b", "c"], 6));

        let mut listing = listing(&transport, 3);

        // The first page is all internal rows; the lister skips ahead
        // transparently and the first visible batch starts at "a".
        let batch = listing.next_batch().await.unwrap().expect("batch");
        assert_eq!(batch.names, vec!["a", "b"]);

        let batch = listing.next_batch().await.unwrap().expect("batch");
        assert_eq!(batch.names, vec!["c"]);
        assert_eq!(batch.cumulative, 3);

        assert!(listing.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cumulative_counts_span_batches() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, first_url(3), &page(&["a", "b", "c"], 4));
        transport.push_json(HttpMethod::Get, keyed_url(3, "c"), &page(&["c", "d"], 4));

        let mut listing = listing(&transport, 3);
        assert_eq!(listing.next_batch().await.unwrap().unwrap().cumulative, 3);
        assert_eq!(listing.next_batch().await.unwrap().unwrap().cumulative, 4);
        assert_eq!(listing.cumulative(), 4);
    }

    #[tokio::test]
    async fn page_fetch_failure_is_fatal() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, first_url(3), &page(&["a", "b", "c"], 6));
        transport.push_status(HttpMethod::Get, keyed_url(3, "c"), 500);

        let mut listing = listing(&transport, 3);
        assert!(listing.next_batch().await.unwrap().is_some());

        let err = listing.next_batch().await.expect_err("fatal on page error");
        assert!(err.is_transient(), "error kind is preserved for the caller");
    }

    #[tokio::test]
    async fn empty_registry_yields_no_batches() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, first_url(3), &page(&[], 0));

        let mut listing = listing(&transport, 3);
        assert!(listing.next_batch().await.unwrap().is_none());
    }
}
