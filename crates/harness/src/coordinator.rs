//! Run ownership and batch scheduling.
//!
//! A coordinator exclusively owns one run: it partitions the suite,
//! dispatches batch executors under the per-run semaphore, merges batch
//! results, decides the terminal state, persists the artifact, and
//! publishes run-scoped events. Batch state lives behind a lock that is
//! only touched between suspension points; executors work on a task-local
//! copy and commit it back when the batch reaches a terminal state.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use docbench_domain::{
    run::partition, Artifact, ArtifactId, Batch, BatchStatus, Error, EventKind, Result, Run,
    RunId, RunRequest, RunStatus, TestCase, TestSuite, Topic,
};
use docbench_infrastructure::{Store, VariantCatalog};

use crate::bus::EventBus;
use crate::cancel::CancelToken;
use crate::client::ModelClient;
use crate::clock::Clock;
use crate::config::HarnessConfig;
use crate::executor::{BatchExecutor, ExecutorConfig};

/// Point-in-time view of a batch for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub number: u32,
    pub status: BatchStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub size: usize,
}

/// Point-in-time view of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub status: RunStatus,
    pub total_tests: usize,
    pub completed_tests: usize,
    pub total_batches: usize,
    pub completed_batches: usize,
    pub failed_batches: usize,
    pub batches: Vec<BatchSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<ArtifactId>,
}

pub struct RunCoordinator {
    run: RwLock<Run>,
    suite: Arc<TestSuite>,
    bus: EventBus,
    client: Arc<dyn ModelClient>,
    store: Arc<dyn Store>,
    catalog: Arc<dyn VariantCatalog>,
    clock: Arc<dyn Clock>,
    config: HarnessConfig,
    cancel: CancelToken,
    semaphore: Arc<Semaphore>,
}

impl RunCoordinator {
    /// Validate the request against the (already filtered) suite and set
    /// up the run with its batches.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request: RunRequest,
        suite: Arc<TestSuite>,
        bus: EventBus,
        client: Arc<dyn ModelClient>,
        store: Arc<dyn Store>,
        catalog: Arc<dyn VariantCatalog>,
        clock: Arc<dyn Clock>,
        config: HarnessConfig,
    ) -> Result<Arc<Self>> {
        request.validate(suite.len())?;
        let batches = partition(&suite.ids(), &request.sizing, config.max_retries)?;
        let run = Run::new(RunId::new(), request, batches, clock.now_utc());
        let semaphore = Arc::new(Semaphore::new(config.batch_concurrency));

        Ok(Arc::new(Self {
            run: RwLock::new(run),
            suite,
            bus,
            client,
            store,
            catalog,
            clock,
            config,
            cancel: CancelToken::new(),
            semaphore,
        }))
    }

    pub fn id(&self) -> RunId {
        self.run.read().id
    }

    pub fn is_terminal(&self) -> bool {
        self.run.read().is_terminal()
    }

    /// Request cooperative cancellation of the whole run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let run = self.run.read();
        let completed_tests = run
            .batches
            .iter()
            .filter(|b| b.status == BatchStatus::Completed)
            .map(Batch::size)
            .sum();
        RunSnapshot {
            run_id: run.id,
            status: run.status,
            total_tests: run.total_tests(),
            completed_tests,
            total_batches: run.batches.len(),
            completed_batches: run.completed_batches(),
            failed_batches: run.failed_batches(),
            batches: run
                .batches
                .iter()
                .map(|b| BatchSnapshot {
                    number: b.number,
                    status: b.status,
                    retry_count: b.retry_count,
                    max_retries: b.max_retries,
                    size: b.size(),
                })
                .collect(),
            error: run.error.clone(),
            artifact_id: run.artifact_id.clone(),
        }
    }

    /// Drive the run to a terminal state.
    #[instrument(skip(self), fields(run_id = %self.id()))]
    pub async fn execute(self: Arc<Self>) {
        let run_id = self.id();
        let topic = Topic::Run(run_id);

        {
            let run = self.run.read();
            self.bus.publish(
                &topic,
                Some(run_id),
                None,
                EventKind::RunStarted {
                    total_batches: run.batches.len(),
                    total_tests: run.total_tests(),
                },
            );
        }
        info!("run started");

        let doc = match self.fetch_doc().await {
            Ok(doc) => Arc::new(doc),
            Err(error) => {
                self.finish_failed(error);
                return;
            }
        };

        // Soft run timeout: expiry degrades into cancellation.
        let watchdog = tokio::spawn({
            let cancel = self.cancel.clone();
            let budget = self.config.run_timeout;
            async move {
                tokio::select! {
                    _ = tokio::time::sleep(budget) => {
                        warn!(budget_secs = budget.as_secs(), "run timeout expired, cancelling");
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            }
        });

        let executor = Arc::new(BatchExecutor::new(
            self.client.clone(),
            self.bus.clone(),
            ExecutorConfig::from(&self.config),
        ));

        let batch_count = self.run.read().batches.len();
        let mut handles = Vec::with_capacity(batch_count);
        for index in 0..batch_count {
            let this = self.clone();
            let executor = executor.clone();
            let doc = doc.clone();
            handles.push(tokio::spawn(async move {
                this.drive_batch(executor, index, &doc).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        watchdog.abort();

        self.finalize().await;
    }

    /// Execute one batch under the run semaphore and commit its terminal
    /// state back into the run.
    async fn drive_batch(&self, executor: Arc<BatchExecutor>, index: usize, doc: &str) {
        let run_id = self.id();
        let topic = Topic::Run(run_id);

        let permit = tokio::select! {
            _ = self.cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        };

        let (mut batch, temperature, max_tokens) = {
            let run = self.run.read();
            (
                run.batches[index].clone(),
                run.request.temperature,
                run.request.max_tokens,
            )
        };

        if permit.is_none() || self.cancel.is_cancelled() {
            // Pending batches fail immediately on cancellation.
            let cancelled = Error::Cancelled;
            batch.mark_failed(&cancelled);
            self.bus.publish(
                &topic,
                Some(run_id),
                Some(batch.number),
                EventKind::BatchFailed {
                    batch: batch.number,
                    error: cancelled.to_string(),
                },
            );
            self.commit_batch(index, batch);
            return;
        }

        let cases = self.cases_for(&batch);
        let _ = executor
            .execute(
                topic,
                run_id,
                &mut batch,
                &cases,
                doc,
                temperature,
                max_tokens,
                &self.cancel,
            )
            .await;
        self.commit_batch(index, batch);
    }

    /// Rerun one batch with a fresh executor. Accepted only while the run
    /// is not terminal; a successful rerun overwrites the batch's
    /// responses, a failed one leaves the original state untouched.
    pub async fn rerun_batch(&self, batch_num: u32) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::BadRequest(format!(
                "run {} is terminal, rerun refused",
                self.id()
            )));
        }

        let run_id = self.id();
        let (index, test_ids, max_retries, temperature, max_tokens) = {
            let run = self.run.read();
            let index = run
                .batches
                .iter()
                .position(|b| b.number == batch_num)
                .ok_or_else(|| Error::NotFound(format!("batch {batch_num} in run {run_id}")))?;
            (
                index,
                run.batches[index].test_ids.clone(),
                run.batches[index].max_retries,
                run.request.temperature,
                run.request.max_tokens,
            )
        };

        info!(run_id = %run_id, batch = batch_num, "manual batch rerun requested");
        let doc = self.fetch_doc().await?;
        let mut fresh = Batch::new(batch_num, test_ids, max_retries);
        let cases = self.cases_for(&fresh);

        let executor = BatchExecutor::new(
            self.client.clone(),
            self.bus.clone(),
            ExecutorConfig::from(&self.config),
        );
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| Error::Cancelled)?
            }
        };

        let outcome = executor
            .execute(
                Topic::BatchRerun(run_id),
                run_id,
                &mut fresh,
                &cases,
                &doc,
                temperature,
                max_tokens,
                &self.cancel,
            )
            .await;

        if fresh.status == BatchStatus::Completed && !self.is_terminal() {
            self.commit_batch(index, fresh);
        }
        outcome
    }

    fn cases_for(&self, batch: &Batch) -> Vec<TestCase> {
        batch
            .test_ids
            .iter()
            .filter_map(|id| self.suite.get(id).cloned())
            .collect()
    }

    fn commit_batch(&self, index: usize, batch: Batch) {
        self.run.write().batches[index] = batch;
    }

    async fn fetch_doc(&self) -> Result<String> {
        let variant_name = self.run.read().request.variant.clone();
        let variant = self.catalog.get(&variant_name).await?;
        self.catalog.content(&variant).await
    }

    /// Decide the terminal state once every batch has settled.
    async fn finalize(&self) {
        let run_id = self.id();
        let topic = Topic::Run(run_id);

        if self.cancel.is_cancelled() {
            self.run.write().mark_cancelled();
            self.bus
                .publish(&topic, Some(run_id), None, EventKind::RunCancelled);
            self.bus
                .publish(&Topic::Global, Some(run_id), None, EventKind::RunCancelled);
            info!("run cancelled");
            return;
        }

        let any_completed = {
            let run = self.run.read();
            run.batches
                .iter()
                .any(|b| b.status == BatchStatus::Completed)
        };
        if !any_completed {
            let detail = self
                .run
                .read()
                .batches
                .iter()
                .find_map(|b| b.last_error.clone())
                .unwrap_or_else(|| "no batches completed".to_string());
            self.finish_failed(Error::Transport(format!("all batches failed: {detail}")));
            return;
        }

        let artifact = {
            let run = self.run.read();
            let created_at = self.clock.now_utc();
            let id = ArtifactId::generate(&run.request.model, &run.request.variant, created_at);
            Artifact::from_run(id, &run, self.suite.name(), created_at)
        };

        match self.store.write_artifact(&artifact).await {
            Ok(()) => {
                self.run.write().mark_completed(artifact.id.clone());
                let kind = EventKind::RunCompleted {
                    artifact_id: artifact.id.clone(),
                };
                self.bus.publish(&topic, Some(run_id), None, kind.clone());
                self.bus.publish(&Topic::Global, Some(run_id), None, kind);
                info!(artifact_id = %artifact.id, missing = artifact.metadata.missing.len(), "run completed");
            }
            Err(store_error) => {
                self.finish_failed(store_error);
            }
        }
    }

    fn finish_failed(&self, failure: Error) {
        let run_id = self.id();
        self.run.write().mark_failed(&failure);
        let kind = EventKind::RunFailed {
            error: failure.to_string(),
        };
        self.bus
            .publish(&Topic::Run(run_id), Some(run_id), None, kind.clone());
        self.bus.publish(&Topic::Global, Some(run_id), None, kind);
        error!(error = %failure, "run failed");
    }
}
