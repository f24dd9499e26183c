//! Client-side rate limiting for oracle calls.
//!
//! A token bucket shared by every run that uses the same provider. Callers
//! wait for a token instead of failing, which is the only backpressure the
//! service applies.

use async_trait::async_trait;
use quizpilot_core::error::ProviderError;
use quizpilot_core::provider::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A token bucket: `capacity` tokens, refilled continuously at
/// `requests_per_minute / 60` tokens per second.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Starts full. Zero values are clamped to one.
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            refill_per_sec: f64::from(requests_per_minute.max(1)) / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, or report how long until one is available.
    fn try_take(&self) -> Result<(), Duration> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        while let Err(wait) = self.try_take() {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limiter: waiting for token");
            tokio::time::sleep(wait).await;
        }
    }
}

/// A provider decorator that takes a token before every completion.
pub struct RateLimitedProvider {
    inner: Arc<dyn quizpilot_core::Provider>,
    bucket: TokenBucket,
}

impl RateLimitedProvider {
    pub fn new(inner: Arc<dyn quizpilot_core::Provider>, requests_per_minute: u32, burst: u32) -> Self {
        Self {
            inner,
            bucket: TokenBucket::new(requests_per_minute, burst),
        }
    }
}

#[async_trait]
impl quizpilot_core::Provider for RateLimitedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.bucket.acquire().await;
        self.inner.complete(request).await
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
