//! Orchestration engine for the docbench benchmark harness.
//!
//! Wires the event bus, queue manager, run coordinators, batch executors,
//! and the evaluator scheduler into one facade. The facade surface is
//! transport-agnostic; UI and API layers sit on top of it.

pub mod bus;
pub mod cancel;
pub mod client;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod evaluator;
pub mod executor;
pub mod queue;

pub use bus::{EventBus, EventStream};
pub use cancel::CancelToken;
pub use client::{ModelClient, ModelResponse, TokenUsage};
pub use clock::{Clock, SystemClock};
pub use config::HarnessConfig;
pub use coordinator::{BatchSnapshot, RunCoordinator, RunSnapshot};
pub use evaluator::{EvalState, EvaluatorScheduler};
pub use queue::{GlobalProgress, OverallStatus, QueueManager};

use std::sync::Arc;
use tokio::task::JoinHandle;

use docbench_application::{stats, CollectionComparison, SyntaxChecker};
use docbench_domain::{
    ArtifactId, Collection, CollectionName, Error, EvalResult, EvalSummary, Result, RunId,
    RunRequest, TestSuite, Topic,
};
use docbench_infrastructure::{Store, VariantCatalog};

/// The benchmark harness facade.
pub struct Harness {
    bus: EventBus,
    queue: QueueManager,
    evaluator: Arc<EvaluatorScheduler>,
    store: Arc<dyn Store>,
    listener: JoinHandle<()>,
}

impl Harness {
    pub fn new(
        suite: TestSuite,
        client: Arc<dyn ModelClient>,
        store: Arc<dyn Store>,
        catalog: Arc<dyn VariantCatalog>,
        checker: Arc<dyn SyntaxChecker>,
        config: HarnessConfig,
    ) -> Self {
        Self::with_clock(suite, client, store, catalog, checker, config, Arc::new(SystemClock))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_clock(
        suite: TestSuite,
        client: Arc<dyn ModelClient>,
        store: Arc<dyn Store>,
        catalog: Arc<dyn VariantCatalog>,
        checker: Arc<dyn SyntaxChecker>,
        config: HarnessConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bus = EventBus::with_capacity(config.subscriber_queue_capacity, config.ring_capacity);
        let suite = Arc::new(suite);
        let evaluator = EvaluatorScheduler::new(
            store.clone(),
            suite.clone(),
            checker,
            bus.clone(),
            config.evaluator_concurrency,
        );
        let listener = evaluator.spawn_listener();
        let queue = QueueManager::new(
            suite,
            bus.clone(),
            client,
            store.clone(),
            catalog,
            clock,
            config,
            evaluator.clone(),
        );

        Self {
            bus,
            queue,
            evaluator,
            store,
            listener,
        }
    }

    /// Submit a run request; returns one run id per queued run.
    pub async fn submit(&self, request: RunRequest) -> Result<Vec<RunId>> {
        self.queue.submit(request).await
    }

    pub fn cancel_run(&self, run_id: RunId) -> Result<()> {
        self.queue.cancel_run(run_id)
    }

    pub fn cancel_all(&self) {
        self.queue.cancel_all();
    }

    /// Request a manual rerun of one batch. The rerun proceeds in the
    /// background; progress is published on `batch_rerun/<run_id>`.
    pub fn rerun_batch(&self, run_id: RunId, batch_num: u32) -> Result<()> {
        let coordinator = self
            .queue
            .get(run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if coordinator.is_terminal() {
            return Err(Error::BadRequest(format!(
                "run {run_id} is terminal, rerun refused"
            )));
        }
        if !coordinator
            .snapshot()
            .batches
            .iter()
            .any(|b| b.number == batch_num)
        {
            return Err(Error::NotFound(format!("batch {batch_num} in run {run_id}")));
        }

        tokio::spawn(async move {
            let _ = coordinator.rerun_batch(batch_num).await;
        });
        Ok(())
    }

    /// Subscribe to a topic, optionally resuming from a sequence cursor.
    pub fn subscribe(&self, topic: &Topic, cursor: Option<u64>) -> EventStream {
        self.bus.subscribe(topic, cursor)
    }

    pub fn run_status(&self, run_id: RunId) -> Option<RunSnapshot> {
        self.queue.get(run_id).map(|c| c.snapshot())
    }

    pub fn global_progress(&self) -> GlobalProgress {
        self.queue.global_progress()
    }

    /// Evaluate an artifact; idempotent, returns the cached result when
    /// one exists.
    pub async fn evaluate(&self, artifact_id: &ArtifactId) -> Result<EvalResult> {
        self.evaluator.evaluate(artifact_id).await
    }

    /// Group artifacts under a named collection, creating it on first use.
    pub async fn promote_to_collection(
        &self,
        artifact_ids: &[ArtifactId],
        name: &str,
    ) -> Result<Collection> {
        let name = CollectionName::new(name)?;
        match self.store.read_collection(&name).await {
            Ok(_) => {
                for id in artifact_ids {
                    self.store.add_to_collection(&name, id).await?;
                }
                self.store.read_collection(&name).await
            }
            Err(Error::NotFound(_)) => self.store.create_collection(&name, artifact_ids).await,
            Err(other) => Err(other),
        }
    }

    /// Compare two collections, evaluating any members that have no cached
    /// result yet.
    pub async fn compare(&self, left: &str, right: &str) -> Result<CollectionComparison> {
        let left_name = CollectionName::new(left)?;
        let right_name = CollectionName::new(right)?;

        let left_summaries = self.collection_summaries(&left_name).await?;
        let right_summaries = self.collection_summaries(&right_name).await?;

        Ok(stats::compare(
            left_name.as_str(),
            &left_summaries,
            right_name.as_str(),
            &right_summaries,
        ))
    }

    async fn collection_summaries(&self, name: &CollectionName) -> Result<Vec<EvalSummary>> {
        let collection = self.store.read_collection(name).await?;
        let mut summaries = Vec::with_capacity(collection.len());
        for id in &collection.artifact_ids {
            summaries.push(self.evaluator.evaluate(id).await?.summary);
        }
        Ok(summaries)
    }

    /// Cancel all runs and stop the evaluation listener.
    pub fn shutdown(&self) {
        self.queue.cancel_all();
        self.listener.abort();
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
