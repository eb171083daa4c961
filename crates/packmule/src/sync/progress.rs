//! Progress events emitted by the sync and backfill paths.
//!
//! Consumers (the CLI's progress bars, structured logging in workers)
//! subscribe through an optional callback; the pipeline never depends on
//! anyone listening.

/// Progress events for listing and backfill operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// The full-registry listing started.
    ListingStarted,

    /// One listing batch was stored and enqueued.
    ListedBatch {
        /// Names on this batch.
        count: usize,
        /// Names produced so far.
        cumulative: u64,
        /// Upstream's row-count estimate (upper bound).
        estimated_total: u64,
    },

    /// A drain tick advanced the backfill.
    TickAdvanced {
        offset: u64,
        total: u64,
        /// Enqueue throughput in packages/second.
        rate: f64,
        /// Remaining-work estimate in seconds, when computable.
        eta_seconds: Option<f64>,
    },

    /// The backfill reached completion.
    BackfillCompleted {
        /// Final package count.
        total: u64,
    },

    /// A package was upserted into the search index.
    PackageSynced {
        name: String,
        version_changed: bool,
    },

    /// A package was removed from the search index.
    PackageDeleted { name: String },
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Invoke the callback if one is registered.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(callback) = on_progress {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_invokes_registered_callbacks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_capture = Arc::clone(&calls);
        let callback: ProgressCallback = Box::new(move |event| {
            if let SyncProgress::BackfillCompleted { total } = event {
                assert_eq!(total, 42);
            }
            calls_capture.fetch_add(1, Ordering::SeqCst);
        });

        emit(Some(&callback), SyncProgress::BackfillCompleted { total: 42 });
        emit(None, SyncProgress::ListingStarted);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
