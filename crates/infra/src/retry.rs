//! Caller-side retry for placement conflicts.
//!
//! Only [`PlacementError::TransactionConflict`] is retried; it guarantees the
//! failed attempt wrote nothing. Business failures are returned on the first
//! attempt.
//!
//! Backoff doubles from `base_delay` up to `max_delay`:
//! 10ms, 20ms, 40ms, 80ms, ... with the default policy.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use comanda_sales::{Order, PlacementError, PlacementRequest};

use crate::placement::PlacementEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Place `request`, retrying transaction conflicts according to `policy`.
pub async fn place_order_with_retry<E>(
    engine: &E,
    request: &PlacementRequest,
    policy: &RetryPolicy,
) -> Result<Order, PlacementError>
where
    E: PlacementEngine + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match engine.place_order(request).await {
            Ok(order) => return Ok(order),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let backoff = policy.backoff(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "placement conflicted, retrying after backoff"
                );
                sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    error!(attempts = attempt, error = %e, "placement failed after max retries");
                }
                return Err(e);
            }
        }
    }
}
