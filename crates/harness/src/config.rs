//! Harness configuration.
//!
//! Every concurrency cap and timeout is configuration, not a constant:
//! per-run batch concurrency, evaluator concurrency, batch and run
//! timeouts, the retry budget, and the backoff curve each have their own
//! knob.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Concurrent batch executors per run.
    pub batch_concurrency: usize,
    /// Concurrently executing runs across the whole queue.
    pub run_concurrency: usize,
    /// Concurrent evaluation jobs across all runs.
    pub evaluator_concurrency: usize,
    /// Wall-clock budget per batch attempt.
    pub batch_timeout: Duration,
    /// Soft budget for a whole run; expiry cancels it.
    pub run_timeout: Duration,
    /// Retry budget per batch.
    pub max_retries: u32,
    /// First backoff delay.
    pub backoff_base: Duration,
    /// Multiplier between successive delays.
    pub backoff_factor: f64,
    /// Upper bound on any single delay.
    pub backoff_cap: Duration,
    /// Symmetric jitter fraction applied to each delay.
    pub backoff_jitter: f64,
    /// Bounded queue length per event subscriber.
    pub subscriber_queue_capacity: usize,
    /// Events retained per topic for cursor replay.
    pub ring_capacity: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: 4,
            run_concurrency: 8,
            evaluator_concurrency: 2,
            batch_timeout: Duration::from_secs(600),
            run_timeout: Duration::from_secs(30 * 60),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_factor: 2.0,
            backoff_cap: Duration::from_secs(30),
            backoff_jitter: 0.2,
            subscriber_queue_capacity: 256,
            ring_capacity: 1024,
        }
    }
}

impl HarnessConfig {
    pub fn with_batch_concurrency(mut self, limit: usize) -> Self {
        self.batch_concurrency = limit.max(1);
        self
    }

    pub fn with_run_concurrency(mut self, limit: usize) -> Self {
        self.run_concurrency = limit.max(1);
        self
    }

    pub fn with_evaluator_concurrency(mut self, limit: usize) -> Self {
        self.evaluator_concurrency = limit.max(1);
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, factor: f64, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_factor = factor;
        self.backoff_cap = cap;
        self
    }
}
