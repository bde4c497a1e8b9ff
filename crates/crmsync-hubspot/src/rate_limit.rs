//! Process-wide limiter for remote calls
//!
//! Bounds the number of calls in flight and spaces consecutive call starts
//! by a fixed minimum interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::trace;

use crate::config::RateLimitConfig;
use crmsync::remote::RemoteError;

pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    min_interval: Duration,
    next_start: Mutex<Instant>,
}

/// Held for the duration of one call; releases a concurrency slot on drop
#[derive(Debug)]
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            min_interval: config.min_interval(),
            next_start: Mutex::new(Instant::now()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a concurrency slot, then for this call's start time
    pub async fn acquire(&self) -> Result<RatePermit, RemoteError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RemoteError::Transport("rate limiter closed".to_string()))?;

        let start = {
            let mut next_start = self.next_start.lock().await;
            let start = (*next_start).max(Instant::now());
            *next_start = start + self.min_interval;
            start
        };

        if start > Instant::now() {
            trace!(
                "[RateLimiter] Delaying call by {:?}",
                start.saturating_duration_since(Instant::now())
            );
            sleep_until(start).await;
        }
        Ok(RatePermit { _permit: permit })
    }
}
