//! Queue management: multiple simultaneous runs per submit.
//!
//! One submit with queue size N spawns N coordinators, each with a fresh
//! run id over the same request. The manager is the single owned registry
//! of coordinators; cross-run progress and the derived overall status are
//! computed on read, never stored.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

use docbench_domain::{Error, Result, RunId, RunRequest, RunStatus, TestSuite};
use docbench_infrastructure::{Store, VariantCatalog};

use crate::bus::EventBus;
use crate::client::ModelClient;
use crate::clock::Clock;
use crate::config::HarnessConfig;
use crate::coordinator::RunCoordinator;
use crate::evaluator::{EvalState, EvaluatorScheduler};

/// Derived status across every run the manager owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Running,
    Evaluating,
    Completed,
    Failed,
    Cancelled,
}

/// Aggregated cross-run progress.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalProgress {
    pub status: OverallStatus,
    pub total_runs: usize,
    pub active_runs: usize,
    pub total_batches: usize,
    pub completed_batches: usize,
    pub failed_batches: usize,
    pub evaluations_outstanding: usize,
}

pub struct QueueManager {
    suite: Arc<TestSuite>,
    bus: EventBus,
    client: Arc<dyn ModelClient>,
    store: Arc<dyn Store>,
    catalog: Arc<dyn VariantCatalog>,
    clock: Arc<dyn Clock>,
    config: HarnessConfig,
    evaluator: Arc<EvaluatorScheduler>,
    runs: RwLock<Vec<Arc<RunCoordinator>>>,
    /// Queue-wide cap on concurrently executing runs, distinct from the
    /// per-run batch and evaluator limits.
    run_semaphore: Arc<Semaphore>,
}

impl QueueManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        suite: Arc<TestSuite>,
        bus: EventBus,
        client: Arc<dyn ModelClient>,
        store: Arc<dyn Store>,
        catalog: Arc<dyn VariantCatalog>,
        clock: Arc<dyn Clock>,
        config: HarnessConfig,
        evaluator: Arc<EvaluatorScheduler>,
    ) -> Self {
        let run_semaphore = Arc::new(Semaphore::new(config.run_concurrency));
        Self {
            suite,
            bus,
            client,
            store,
            catalog,
            clock,
            config,
            evaluator,
            runs: RwLock::new(Vec::new()),
            run_semaphore,
        }
    }

    /// Spawn `queue_size` coordinators for the request. Configuration
    /// violations reject the whole submit before any run starts.
    pub async fn submit(&self, request: RunRequest) -> Result<Vec<RunId>> {
        let suite = Arc::new(self.suite.with_limit(request.test_limit)?);
        request.validate(suite.len())?;

        let mut coordinators = Vec::with_capacity(request.queue_size);
        for _ in 0..request.queue_size {
            let coordinator = RunCoordinator::new(
                request.clone(),
                suite.clone(),
                self.bus.clone(),
                self.client.clone(),
                self.store.clone(),
                self.catalog.clone(),
                self.clock.clone(),
                self.config.clone(),
            )?;
            coordinators.push(coordinator);
        }

        let run_ids: Vec<RunId> = coordinators.iter().map(|c| c.id()).collect();
        self.runs.write().extend(coordinators.iter().cloned());

        for coordinator in coordinators {
            let semaphore = self.run_semaphore.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                coordinator.execute().await;
            });
        }

        info!(
            model = %request.model,
            variant = %request.variant,
            queue_size = request.queue_size,
            "submitted runs"
        );
        Ok(run_ids)
    }

    pub fn get(&self, run_id: RunId) -> Option<Arc<RunCoordinator>> {
        self.runs
            .read()
            .iter()
            .find(|c| c.id() == run_id)
            .cloned()
    }

    pub fn cancel_run(&self, run_id: RunId) -> Result<()> {
        let coordinator = self
            .get(run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        coordinator.cancel();
        Ok(())
    }

    /// Cancel every run the manager owns.
    pub fn cancel_all(&self) {
        for coordinator in self.runs.read().iter() {
            coordinator.cancel();
        }
    }

    /// Aggregate progress across all runs, with the overall status
    /// derived on read.
    pub fn global_progress(&self) -> GlobalProgress {
        let snapshots: Vec<_> = self.runs.read().iter().map(|c| c.snapshot()).collect();

        let total_runs = snapshots.len();
        let active_runs = snapshots.iter().filter(|s| !s.status.is_terminal()).count();
        let total_batches: usize = snapshots.iter().map(|s| s.total_batches).sum();
        let completed_batches: usize = snapshots.iter().map(|s| s.completed_batches).sum();
        let failed_batches: usize = snapshots.iter().map(|s| s.failed_batches).sum();

        // A completed run whose artifact has not finished scoring keeps the
        // submit in `evaluating`.
        let evaluations_outstanding = snapshots
            .iter()
            .filter(|s| s.status == RunStatus::Completed)
            .filter_map(|s| s.artifact_id.as_ref())
            .filter(|id| {
                !matches!(
                    self.evaluator.state(id),
                    Some(EvalState::Completed) | Some(EvalState::Failed)
                )
            })
            .count();

        let status = if active_runs > 0 {
            OverallStatus::Running
        } else if evaluations_outstanding > 0 {
            OverallStatus::Evaluating
        } else if snapshots.iter().any(|s| s.status == RunStatus::Failed) {
            OverallStatus::Failed
        } else if snapshots.iter().any(|s| s.status == RunStatus::Cancelled) {
            OverallStatus::Cancelled
        } else {
            OverallStatus::Completed
        };

        GlobalProgress {
            status,
            total_runs,
            active_runs,
            total_batches,
            completed_batches,
            failed_batches,
            evaluations_outstanding,
        }
    }
}
