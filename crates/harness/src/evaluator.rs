//! Evaluation scheduling.
//!
//! Watches the global topic for run completions and scores each artifact
//! under its own concurrency cap, independent of batch execution. Results
//! are written to the store keyed by artifact id; evaluation is
//! idempotent and returns the cached result when one exists.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use docbench_application::{Scorer, SyntaxChecker};
use docbench_domain::{ArtifactId, EvalResult, Error, EventKind, Result, TestSuite, Topic};
use docbench_infrastructure::Store;

use crate::bus::EventBus;

/// Evaluation lifecycle per artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalState {
    Queued,
    Evaluating,
    Completed,
    Failed,
}

pub struct EvaluatorScheduler {
    store: Arc<dyn Store>,
    suite: Arc<TestSuite>,
    scorer: Scorer,
    bus: EventBus,
    semaphore: Arc<Semaphore>,
    states: RwLock<HashMap<ArtifactId, EvalState>>,
}

impl EvaluatorScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        suite: Arc<TestSuite>,
        checker: Arc<dyn SyntaxChecker>,
        bus: EventBus,
        concurrency: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            suite,
            scorer: Scorer::new(checker),
            bus,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            states: RwLock::new(HashMap::new()),
        })
    }

    /// Subscribe to run completions and schedule evaluation jobs for each
    /// completed artifact. Runs until the bus closes the stream.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        let mut stream = self.bus.subscribe(&Topic::Global, None);
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if let EventKind::RunCompleted { artifact_id } = event.kind {
                    this.schedule(artifact_id);
                }
            }
        })
    }

    /// Enqueue an evaluation job unless one is already underway or done.
    pub fn schedule(self: &Arc<Self>, artifact_id: ArtifactId) {
        {
            let mut states = self.states.write();
            match states.get(&artifact_id) {
                Some(EvalState::Queued) | Some(EvalState::Evaluating) | Some(EvalState::Completed) => {
                    return;
                }
                _ => {}
            }
            states.insert(artifact_id.clone(), EvalState::Queued);
        }

        let this = self.clone();
        tokio::spawn(async move {
            let _ = this.run_job(&artifact_id).await;
        });
    }

    async fn run_job(&self, artifact_id: &ArtifactId) -> Result<EvalResult> {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return Err(Error::Cancelled);
        };

        self.states
            .write()
            .insert(artifact_id.clone(), EvalState::Evaluating);
        self.bus.publish(
            &Topic::Global,
            None,
            None,
            EventKind::EvaluationStarted {
                artifact_id: artifact_id.clone(),
            },
        );

        match self.evaluate_inner(artifact_id).await {
            Ok(result) => {
                self.states
                    .write()
                    .insert(artifact_id.clone(), EvalState::Completed);
                self.bus.publish(
                    &Topic::Global,
                    None,
                    None,
                    EventKind::EvaluationCompleted {
                        artifact_id: artifact_id.clone(),
                        overall_percentage: result.summary.overall_percentage,
                    },
                );
                info!(
                    artifact_id = %artifact_id,
                    overall = result.summary.overall_percentage,
                    "evaluation completed"
                );
                Ok(result)
            }
            Err(failure) => {
                self.states
                    .write()
                    .insert(artifact_id.clone(), EvalState::Failed);
                self.bus.publish(
                    &Topic::Global,
                    None,
                    None,
                    EventKind::EvaluationFailed {
                        artifact_id: artifact_id.clone(),
                        error: failure.to_string(),
                    },
                );
                warn!(artifact_id = %artifact_id, error = %failure, "evaluation failed");
                Err(failure)
            }
        }
    }

    async fn evaluate_inner(&self, artifact_id: &ArtifactId) -> Result<EvalResult> {
        if let Some(cached) = self.store.read_eval_result(artifact_id).await? {
            return Ok(cached);
        }
        let artifact = self.store.read_artifact(artifact_id).await?;
        let result = self.scorer.score(&artifact, &self.suite).await;
        self.store.write_eval_result(&result).await?;
        Ok(result)
    }

    /// On-demand evaluation. Returns the cached result when present;
    /// otherwise scores now under the evaluator semaphore, publishing the
    /// same events as a scheduled job.
    pub async fn evaluate(&self, artifact_id: &ArtifactId) -> Result<EvalResult> {
        if let Some(cached) = self.store.read_eval_result(artifact_id).await? {
            return Ok(cached);
        }
        self.run_job(artifact_id).await
    }

    pub fn state(&self, artifact_id: &ArtifactId) -> Option<EvalState> {
        self.states.read().get(artifact_id).copied()
    }

    /// Jobs queued or in flight; drives the queue-level `evaluating`
    /// status.
    pub fn outstanding(&self) -> usize {
        self.states
            .read()
            .values()
            .filter(|s| matches!(s, EvalState::Queued | EvalState::Evaluating))
            .count()
    }
}
