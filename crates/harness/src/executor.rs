//! Per-batch execution state machine.
//!
//! Drives one batch through pending → running → (retrying → running)* →
//! completed | failed. Each attempt rebuilds the prompt, issues exactly
//! one model call under the batch timeout, and parses the JSON response;
//! a retry replaces the attempt wholesale. Retryable failures back off
//! exponentially with jitter before the next attempt.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use docbench_application::prompt::{build_prompt, parse_responses};
use docbench_domain::{Batch, Error, EventKind, Result, RunId, TestCase, Topic};

use crate::bus::EventBus;
use crate::cancel::CancelToken;
use crate::client::ModelClient;
use crate::config::HarnessConfig;

/// Executor tunables, borrowed from the harness configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub batch_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_factor: f64,
    pub backoff_cap: Duration,
    pub backoff_jitter: f64,
}

impl From<&HarnessConfig> for ExecutorConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            batch_timeout: config.batch_timeout,
            backoff_base: config.backoff_base,
            backoff_factor: config.backoff_factor,
            backoff_cap: config.backoff_cap,
            backoff_jitter: config.backoff_jitter,
        }
    }
}

pub struct BatchExecutor {
    client: Arc<dyn ModelClient>,
    bus: EventBus,
    config: ExecutorConfig,
}

impl BatchExecutor {
    pub fn new(client: Arc<dyn ModelClient>, bus: EventBus, config: ExecutorConfig) -> Self {
        Self {
            client,
            bus,
            config,
        }
    }

    /// Drive `batch` to a terminal state, publishing progress on `topic`.
    ///
    /// Returns the terminal error when the batch fails; the batch itself
    /// carries the resulting status and responses either way.
    pub async fn execute(
        &self,
        topic: Topic,
        run_id: RunId,
        batch: &mut Batch,
        cases: &[TestCase],
        doc: &str,
        temperature: f64,
        max_tokens: u32,
        cancel: &CancelToken,
    ) -> Result<()> {
        let number = batch.number;
        let prompt = build_prompt(doc, cases);

        batch.mark_running();
        self.bus.publish(
            &topic,
            Some(run_id),
            Some(number),
            EventKind::BatchStarted { batch: number },
        );
        info!(run_id = %run_id, batch = number, tests = cases.len(), "batch started");

        loop {
            if cancel.is_cancelled() {
                return self.fail(&topic, run_id, batch, Error::Cancelled);
            }

            let attempt = async {
                let response = self
                    .client
                    .invoke(&prompt, temperature, max_tokens, self.config.batch_timeout)
                    .await?;
                parse_responses(&response.text, cases)
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = tokio::time::timeout(self.config.batch_timeout, attempt) => {
                    match result {
                        Err(_) => Err(Error::Timeout(self.config.batch_timeout)),
                        Ok(parsed) => parsed,
                    }
                }
            };

            match outcome {
                Ok(responses) => {
                    let count = responses.len();
                    batch.mark_completed(responses);
                    self.bus.publish(
                        &topic,
                        Some(run_id),
                        Some(number),
                        EventKind::BatchCompleted {
                            batch: number,
                            responses: count,
                        },
                    );
                    info!(run_id = %run_id, batch = number, responses = count, "batch completed");
                    return Ok(());
                }
                Err(error) if error.is_retryable() && batch.can_retry() => {
                    batch.mark_retrying(&error);
                    let attempt_num = batch.retry_count;
                    self.bus.publish(
                        &topic,
                        Some(run_id),
                        Some(number),
                        EventKind::BatchRetry {
                            batch: number,
                            attempt: attempt_num,
                            reason: error.to_string(),
                        },
                    );
                    let delay = self.backoff_delay(attempt_num);
                    warn!(
                        run_id = %run_id,
                        batch = number,
                        attempt = attempt_num,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "batch retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                    batch.mark_running();
                }
                Err(error) => {
                    return self.fail(&topic, run_id, batch, error);
                }
            }
        }
    }

    fn fail(&self, topic: &Topic, run_id: RunId, batch: &mut Batch, error: Error) -> Result<()> {
        batch.mark_failed(&error);
        self.bus.publish(
            topic,
            Some(run_id),
            Some(batch.number),
            EventKind::BatchFailed {
                batch: batch.number,
                error: error.to_string(),
            },
        );
        warn!(run_id = %run_id, batch = batch.number, error = %error, "batch failed");
        Err(error)
    }

    /// Exponential backoff: base × factor^(attempt-1), capped, with
    /// symmetric jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let raw = self.config.backoff_base.as_secs_f64() * self.config.backoff_factor.powi(exponent);
        let capped = raw.min(self.config.backoff_cap.as_secs_f64());
        let jitter = 1.0 + self.config.backoff_jitter * (rand::thread_rng().gen::<f64>() * 2.0 - 1.0);
        Duration::from_secs_f64((capped * jitter).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            batch_timeout: Duration::from_secs(600),
            backoff_base: Duration::from_secs(1),
            backoff_factor: 2.0,
            backoff_cap: Duration::from_secs(30),
            backoff_jitter: 0.2,
        }
    }

    struct NeverClient;

    #[async_trait::async_trait]
    impl ModelClient for NeverClient {
        async fn invoke(
            &self,
            _prompt: &str,
            _temperature: f64,
            _max_tokens: u32,
            _timeout: Duration,
        ) -> Result<crate::client::ModelResponse> {
            Err(Error::Transport("unused".into()))
        }
    }

    #[test]
    fn backoff_curve_respects_cap_and_jitter() {
        let executor = BatchExecutor::new(Arc::new(NeverClient), EventBus::new(), config());

        // attempt 1 → ~1s, attempt 2 → ~2s, attempt 3 → ~4s, all ±20%.
        for (attempt, expected) in [(1u32, 1.0f64), (2, 2.0), (3, 4.0)] {
            let delay = executor.backoff_delay(attempt).as_secs_f64();
            assert!(
                delay >= expected * 0.8 - 1e-9 && delay <= expected * 1.2 + 1e-9,
                "attempt {attempt}: {delay} outside {expected}±20%"
            );
        }

        // Far along the curve the cap binds: 30s ±20%.
        let late = executor.backoff_delay(12).as_secs_f64();
        assert!(late >= 24.0 - 1e-9 && late <= 36.0 + 1e-9);
    }
}
