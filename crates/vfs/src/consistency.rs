//! Waiting for mutations to become visible.
//!
//! Listing and existence probes may lag behind inserts, deletes and copies.
//! Every mutating VFS operation polls a probe until it reports the expected
//! state, backing off between attempts and giving up after `max_wait`.

use std::future::Future;
use std::time::{Duration, Instant};

use gcsfs_common::{DEFAULT_MAX_WAIT_SECS, DEFAULT_POLL_INTERVAL_MS};

use crate::error::{FsError, Result};

/// Polling policy for `ConsistencyWaiter`.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOptions {
    /// Delay before the second probe.
    pub poll_interval: Duration,
    /// Factor applied to the delay after each failed probe.
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay.
    pub max_poll_interval: Duration,
    /// Total time before giving up. None waits forever.
    pub max_wait: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            backoff_multiplier: 1.5,
            max_poll_interval: Duration::from_secs(10),
            max_wait: Some(Duration::from_secs(DEFAULT_MAX_WAIT_SECS)),
        }
    }
}

impl WaitOptions {
    /// Poll on a fixed interval with no upper bound.
    pub fn unbounded() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            backoff_multiplier: 1.0,
            max_poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_wait: None,
        }
    }

    /// Set the initial poll interval.
    ///
    /// # Arguments
    /// * `interval` - Delay before the second probe
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.max_poll_interval = self.max_poll_interval.max(interval);
        self
    }

    /// Set the backoff multiplier. Values below 1.0, and NaN, are treated
    /// as 1.0.
    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.backoff_multiplier = if multiplier.is_nan() {
            1.0
        } else {
            multiplier.max(1.0)
        };
        self.max_poll_interval = max_interval;
        self
    }

    /// Set the total wait bound.
    ///
    /// # Arguments
    /// * `max_wait` - Total time before `ConsistencyTimeout`, None for no bound
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Next delay, capped at `max_poll_interval`. A product that does not
    /// fit in a `Duration` (overflow, NaN or negative) saturates to the cap.
    fn next_interval(&self, current: Duration) -> Duration {
        let scaled: f64 = current.as_secs_f64() * self.backoff_multiplier;
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.max_poll_interval)
            .min(self.max_poll_interval)
    }
}

/// Polls a probe until it reports true.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyWaiter {
    options: WaitOptions,
}

impl ConsistencyWaiter {
    pub fn new(options: WaitOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Poll `probe` until it returns `Ok(true)`.
    ///
    /// The probe runs immediately, then after each delay. Probe errors end
    /// the wait and are returned as is.
    ///
    /// # Arguments
    /// * `condition` - Description used in logs and in the timeout error
    /// * `probe` - Async check of remote state
    ///
    /// # Errors
    /// `FsError::ConsistencyTimeout` once `max_wait` has elapsed.
    pub async fn wait_until<F, Fut>(&self, condition: &str, mut probe: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let started: Instant = Instant::now();
        let mut interval: Duration = self.options.poll_interval;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if probe().await? {
                if attempts > 1 {
                    tracing::debug!(
                        attempts,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "{} after polling",
                        condition
                    );
                }
                return Ok(());
            }

            let waited: Duration = started.elapsed();
            let delay: Duration = match self.options.max_wait {
                Some(max_wait) if waited >= max_wait => {
                    tracing::warn!(attempts, "Timed out waiting for {}", condition);
                    return Err(FsError::ConsistencyTimeout {
                        condition: condition.to_string(),
                        attempts,
                        waited,
                    });
                }
                Some(max_wait) => interval.min(max_wait - waited),
                None => interval,
            };

            tracing::trace!(
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Waiting for {}",
                condition
            );
            tokio::time::sleep(delay).await;
            interval = self.options.next_interval(interval);
        }
    }
}
