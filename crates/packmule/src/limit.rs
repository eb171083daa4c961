//! Proactive rate limiting for upstream calls.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default registry request pacing (requests per second).
///
/// The public registry tolerates far more, but backfill drains run for
/// hours; staying well under the radar beats finishing a little sooner.
pub const REGISTRY_DEFAULT_RPS: u32 = 20;

/// Default per-user chat delivery pacing.
pub const CHAT_DEFAULT_RPS: u32 = 1;

/// A standalone API rate limiter using the governor crate.
///
/// Call [`ApiRateLimiter::wait`] before each upstream request; the call
/// resolves immediately while under quota and blocks (asynchronously)
/// otherwise.
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second
    /// (a zero value is treated as 1).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second)
            .unwrap_or_else(|| NonZeroU32::new(1).expect("1 is non-zero"));
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner: Arc::new(rate_limiter),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}
