//! Poll scheduling with failure backoff and lifecycle-scoped teardown.
//!
//! Every polled data source (cursor list, aggregate stats, write-activity
//! probe, live status) shares one scheduler abstraction instead of
//! scattering timers per source. Each task runs its operation, sleeps the
//! base interval on success, and backs off exponentially (with jitter, to
//! avoid synchronized retry storms) on transient failure; non-transient
//! failures (bad request, undecodable payload) wait the backoff ceiling,
//! since retrying faster cannot help. A failed poll never propagates: the
//! owner keeps its last good value and the task retries on the next tick.
//!
//! Teardown is idempotent: `shutdown` aborts every task, may be called any
//! number of times, and fires automatically on drop.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{Result, is_transient};

/// Timing policy for one polled source.
#[derive(Debug, Clone)]
pub struct PollCadence {
    /// Base interval between successful polls.
    pub interval: Duration,
    /// Delay after the first consecutive failure.
    pub initial_backoff: Duration,
    /// Ceiling for the failure backoff.
    pub max_backoff: Duration,
    /// Multiplier applied per consecutive failure.
    pub backoff_factor: f64,
    /// Random jitter range as a fraction of the delay.
    pub jitter_percent: f64,
}

impl PollCadence {
    /// Cadence polling at `interval`, backing off from `interval` up to
    /// eight times `interval` on consecutive failures.
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            initial_backoff: interval,
            max_backoff: interval.saturating_mul(8),
            backoff_factor: 2.0,
            jitter_percent: 0.1,
        }
    }

    /// Delay before the next attempt after `failures` consecutive failures
    /// (0-indexed: the first failure uses the initial backoff).
    #[must_use]
    pub fn delay_for_failure(&self, failures: u32) -> Duration {
        let initial_ms = u64::try_from(self.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_backoff.as_millis()).unwrap_or(u64::MAX);

        // Cap the exponent; 31 doublings is already far past any max.
        let exp = failures.min(31) as i32;
        let base_ms = (initial_ms as f64) * self.backoff_factor.max(1.0).powi(exp);
        let base_ms = base_ms.min(max_ms as f64);

        let jitter = if self.jitter_percent > 0.0 {
            let mut rng = rand::rng();
            let range = base_ms * self.jitter_percent;
            rng.random_range(-range..=range)
        } else {
            0.0
        };

        Duration::from_millis((base_ms + jitter).max(0.0) as u64)
    }
}

/// Owns the poll tasks for one monitoring view.
#[derive(Debug, Default)]
pub struct PollScheduler {
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl PollScheduler {
    /// Create a scheduler with no tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a named poll loop. The operation runs immediately, then on
    /// every tick; errors are logged and backed off, never propagated.
    ///
    /// Spawning after `shutdown` is a no-op.
    pub fn spawn<F, Fut>(&self, name: &'static str, cadence: PollCadence, mut operation: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send,
    {
        // Hold the tasks lock across the flag check and the push: shutdown
        // sets the flag before taking this lock, so a task registered here
        // is always visible to the drain.
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.shut_down.load(Ordering::SeqCst) {
            debug!(task = name, "scheduler already shut down, not spawning");
            return;
        }
        let handle = tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                match operation().await {
                    Ok(()) => {
                        if failures > 0 {
                            debug!(task = name, after_failures = failures, "poll recovered");
                        }
                        failures = 0;
                        tokio::time::sleep(cadence.interval).await;
                    }
                    Err(err) => {
                        let delay = if is_transient(&err) {
                            cadence.delay_for_failure(failures)
                        } else {
                            // A malformed request or payload will not fix
                            // itself on a faster retry; go straight to the
                            // backoff ceiling.
                            cadence.max_backoff
                        };
                        failures = failures.saturating_add(1);
                        if is_transient(&err) {
                            warn!(
                                task = name,
                                error = %err,
                                consecutive_failures = failures,
                                delay_ms = delay.as_millis() as u64,
                                "poll failed, backing off"
                            );
                        } else {
                            error!(
                                task = name,
                                error = %err,
                                delay_ms = delay.as_millis() as u64,
                                "poll failed with non-transient error"
                            );
                        }
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        });
        tasks.push(handle);
    }

    /// Abort every task. Safe to call multiple times.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handle in tasks.drain(..) {
            handle.abort();
        }
        debug!("poll scheduler shut down");
    }

    /// Whether `shutdown` has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
