//! Bounded polling for client-rendered state.

use crate::core::error::HarvestError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// How long to wait for a condition and how often to re-check it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready { elapsed: Duration },
    TimedOut { elapsed: Duration },
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }
}

impl WaitPolicy {
    pub fn new(max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            max_wait,
            poll_interval,
        }
    }

    /// Evaluates `predicate` until it returns `true` or `max_wait` has elapsed.
    ///
    /// The predicate is always evaluated at least once, including after the deadline,
    /// so a zero budget still performs a single check. A predicate error ends the wait.
    pub async fn wait_until<F, Fut>(&self, mut predicate: F) -> Result<WaitOutcome, HarvestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, HarvestError>>,
    {
        let start = Instant::now();
        loop {
            if predicate().await? {
                return Ok(WaitOutcome::Ready {
                    elapsed: start.elapsed(),
                });
            }
            let elapsed = start.elapsed();
            if elapsed >= self.max_wait {
                debug!("Gave up waiting after {:?}", elapsed);
                return Ok(WaitOutcome::TimedOut { elapsed });
            }
            let remaining = self.max_wait - elapsed;
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}
