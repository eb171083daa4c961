//! Change-feed follower.
//!
//! The registry exposes an append-only change log keyed by a monotonic
//! sequence number. [`ChangeFeed`] polls it from a cursor, normalizes rows
//! into [`ChangeEvent`]s and hands them to the caller. The cursor advances
//! only on successfully decoded pages, so after a restart the caller
//! resumes from the last observed sequence; duplicate delivery across
//! reconnects is expected and absorbed by the consumer's idempotent job
//! keys.

use std::time::Duration;

use tokio::sync::mpsc;

use super::client::RegistryClient;
use super::error::{FetchOutcome, RegistryError, Result};
use super::types::{ChangeEvent, is_internal_id};

/// Reconnect/backoff parameters for the feed.
///
/// These are deployment configuration; the defaults are a starting point,
/// not a correctness requirement.
#[derive(Debug, Clone)]
pub struct FeedBackoff {
    /// Delay before the first retry; doubles per attempt.
    pub initial: Duration,
    /// Upper bound on the per-attempt delay.
    pub max: Duration,
    /// Attempts before the stream fails fatally.
    pub max_retries: u32,
}

impl Default for FeedBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_retries: 8,
        }
    }
}

impl FeedBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(self.max)
    }
}

/// Polling follower of the registry change feed.
pub struct ChangeFeed {
    client: RegistryClient,
    cursor: u64,
    backoff: FeedBackoff,
    page_limit: usize,
    poll_interval: Duration,
}

impl ChangeFeed {
    pub fn new(client: RegistryClient, since: u64) -> Self {
        Self {
            client,
            cursor: since,
            backoff: FeedBackoff::default(),
            page_limit: 200,
            poll_interval: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: FeedBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The sequence the next poll resumes from.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Fetch the next page of events after the cursor.
    ///
    /// Transient failures are retried with exponential backoff up to the
    /// configured budget; a successful page resets the budget for the next
    /// poll. Internal entries are filtered out, but the cursor still
    /// advances past them — no event is silently dropped, and nothing that
    /// was delivered is ever re-fetched by this session.
    pub async fn poll_once(&mut self) -> Result<Vec<ChangeEvent>> {
        let mut attempt: u32 = 0;

        loop {
            match self.client.fetch_changes(self.cursor, self.page_limit).await {
                FetchOutcome::Success(page) => {
                    let events: Vec<ChangeEvent> = page
                        .results
                        .into_iter()
                        .filter(|row| !is_internal_id(&row.id))
                        .map(|row| ChangeEvent {
                            seq: row.seq,
                            name: row.id,
                            deleted: row.deleted,
                        })
                        .collect();

                    // last_seq covers filtered rows too; advancing past them
                    // is what keeps design documents out of the pipeline
                    // without stalling the cursor.
                    if page.last_seq > self.cursor {
                        self.cursor = page.last_seq;
                    }

                    return Ok(events);
                }
                FetchOutcome::Transient(err) => {
                    if attempt >= self.backoff.max_retries {
                        tracing::error!(
                            cursor = self.cursor,
                            attempts = attempt,
                            error = %err,
                            "Change feed retries exhausted"
                        );
                        return Err(RegistryError::RetriesExhausted {
                            attempts: attempt,
                            message: err.to_string(),
                        });
                    }

                    let delay = self.backoff.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::warn!(
                        cursor = self.cursor,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "Change feed poll failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                FetchOutcome::Permanent(err) => {
                    // A permanent failure on the feed endpoint itself cannot
                    // be polled through; surface it to the supervisor.
                    tracing::error!(cursor = self.cursor, error = %err, "Change feed poll failed permanently");
                    return Err(err);
                }
            }
        }
    }

    /// Drive the feed forever, sending events to `tx`.
    ///
    /// Returns `Ok(())` when the receiver is dropped (clean shutdown) and
    /// `Err` when the retry budget is exhausted — the caller owns the
    /// restart decision, resuming from a persisted cursor.
    pub async fn run(mut self, tx: mpsc::Sender<ChangeEvent>) -> Result<()> {
        loop {
            let events = self.poll_once().await?;
            let quiet = events.is_empty();

            for event in events {
                if tx.send(event).await.is_err() {
                    tracing::debug!("Change event receiver dropped, stopping feed");
                    return Ok(());
                }
            }

            if quiet {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}
