//! Run and batch lifecycle types.
//!
//! A run executes the full suite against one model and variant. Its
//! batches are the unit of model I/O: each batch carries a contiguous
//! slice of the suite and a small retry state machine. Status transitions
//! are the only mutation path; a terminal run is frozen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{Error, Result};
use crate::identifiers::{ArtifactId, RunId};

/// How the suite is cut into batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BatchSizing {
    /// Fixed batch size; the last batch holds the remainder.
    Uniform { size: usize },
    /// Explicit sizes in order; must sum to the suite length.
    Custom { sizes: Vec<usize> },
}

/// A request to benchmark one model against one documentation variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub model: String,
    pub variant: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub sizing: BatchSizing,
    /// Number of parallel runs spawned for this submit (1-20).
    pub queue_size: usize,
    /// Optional prefix filter: only the first N suite cases are run.
    pub test_limit: Option<usize>,
}

impl RunRequest {
    pub fn new(model: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            variant: variant.into(),
            temperature: 0.1,
            max_tokens: 16_000,
            sizing: BatchSizing::Uniform { size: 45 },
            queue_size: 1,
            test_limit: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.sizing = BatchSizing::Uniform { size };
        self
    }

    pub fn with_custom_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.sizing = BatchSizing::Custom { sizes };
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_test_limit(mut self, limit: usize) -> Self {
        self.test_limit = Some(limit);
        self
    }

    /// Validate the request against the (already filtered) suite length.
    ///
    /// All violations are `Error::Config` and reject the submit.
    pub fn validate(&self, suite_len: usize) -> Result<()> {
        if self.model.is_empty() {
            return Err(Error::Config("model is required".into()));
        }
        if self.variant.is_empty() {
            return Err(Error::Config("variant is required".into()));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Config(format!(
                "temperature {} outside [0, 2]",
                self.temperature
            )));
        }
        if !(1..=20).contains(&self.queue_size) {
            return Err(Error::Config(format!(
                "queue size {} outside [1, 20]",
                self.queue_size
            )));
        }
        if let Some(0) = self.test_limit {
            return Err(Error::Config("test limit must be at least 1".into()));
        }
        match &self.sizing {
            BatchSizing::Uniform { size } => {
                if *size < 1 {
                    return Err(Error::Config("batch size must be at least 1".into()));
                }
            }
            BatchSizing::Custom { sizes } => {
                if sizes.is_empty() || sizes.iter().any(|s| *s < 1) {
                    return Err(Error::Config("custom batch sizes must all be at least 1".into()));
                }
                let sum: usize = sizes.iter().sum();
                if sum != suite_len {
                    return Err(Error::Config(format!(
                        "custom batch sizes sum to {sum}, suite has {suite_len} tests"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Batch lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
}

/// A contiguous subset of the suite processed by a single model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// 1-indexed position within the run.
    pub number: u32,
    pub test_ids: Vec<String>,
    pub status: BatchStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    /// Responses from the successful attempt; empty until completed.
    pub responses: BTreeMap<String, String>,
}

impl Batch {
    pub fn new(number: u32, test_ids: Vec<String>, max_retries: u32) -> Self {
        Self {
            number,
            test_ids,
            status: BatchStatus::Pending,
            retry_count: 0,
            max_retries,
            last_error: None,
            responses: BTreeMap::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.test_ids.len()
    }

    pub fn mark_running(&mut self) {
        self.status = BatchStatus::Running;
    }

    /// Record a retryable failure. A retry replaces the attempt wholesale;
    /// no partial responses survive it.
    pub fn mark_retrying(&mut self, error: &Error) {
        self.status = BatchStatus::Retrying;
        self.retry_count += 1;
        self.last_error = Some(error.to_string());
        self.responses.clear();
    }

    pub fn mark_completed(&mut self, responses: BTreeMap<String, String>) {
        self.status = BatchStatus::Completed;
        self.last_error = None;
        self.responses = responses;
    }

    pub fn mark_failed(&mut self, error: &Error) {
        self.status = BatchStatus::Failed;
        self.last_error = Some(error.to_string());
        self.responses.clear();
    }

    /// Whether another attempt is allowed (I4).
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, BatchStatus::Completed | BatchStatus::Failed)
    }
}

/// Partition suite ids into batches per the requested sizing.
///
/// Test ids keep suite order; batch numbers start at 1. Every id lands in
/// exactly one batch and the sizes sum to the suite length (I1, I2).
pub fn partition(ids: &[String], sizing: &BatchSizing, max_retries: u32) -> Result<Vec<Batch>> {
    let sizes: Vec<usize> = match sizing {
        BatchSizing::Uniform { size } => {
            if *size < 1 {
                return Err(Error::Config("batch size must be at least 1".into()));
            }
            let full = ids.len() / size;
            let remainder = ids.len() % size;
            let mut sizes = vec![*size; full];
            if remainder > 0 {
                sizes.push(remainder);
            }
            sizes
        }
        BatchSizing::Custom { sizes } => {
            if sizes.iter().any(|s| *s < 1) {
                return Err(Error::Config("custom batch sizes must all be at least 1".into()));
            }
            let sum: usize = sizes.iter().sum();
            if sum != ids.len() {
                return Err(Error::Config(format!(
                    "custom batch sizes sum to {sum}, suite has {} tests",
                    ids.len()
                )));
            }
            sizes.clone()
        }
    };

    let mut batches = Vec::with_capacity(sizes.len());
    let mut cursor = 0;
    for (i, size) in sizes.iter().enumerate() {
        let slice = ids[cursor..cursor + size].to_vec();
        batches.push(Batch::new((i + 1) as u32, slice, max_retries));
        cursor += size;
    }
    Ok(batches)
}

/// Run lifecycle states. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One execution of the suite against one model, variant, and parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub request: RunRequest,
    pub created_at: DateTime<Utc>,
    pub batches: Vec<Batch>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub artifact_id: Option<ArtifactId>,
}

impl Run {
    pub fn new(id: RunId, request: RunRequest, batches: Vec<Batch>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            request,
            created_at,
            batches,
            status: RunStatus::Running,
            error: None,
            artifact_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn total_tests(&self) -> usize {
        self.batches.iter().map(Batch::size).sum()
    }

    pub fn completed_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.status == BatchStatus::Completed)
            .count()
    }

    pub fn failed_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.status == BatchStatus::Failed)
            .count()
    }

    /// Freeze the run as completed with its persisted artifact.
    pub fn mark_completed(&mut self, artifact_id: ArtifactId) {
        if self.is_terminal() {
            return;
        }
        self.status = RunStatus::Completed;
        self.artifact_id = Some(artifact_id);
    }

    pub fn mark_failed(&mut self, error: &Error) {
        if self.is_terminal() {
            return;
        }
        self.status = RunStatus::Failed;
        self.error = Some(error.to_string());
    }

    pub fn mark_cancelled(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.status = RunStatus::Cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("t{i}")).collect()
    }

    #[test]
    fn uniform_partition_with_remainder() {
        let batches = partition(&ids(10), &BatchSizing::Uniform { size: 4 }, 3).unwrap();
        let sizes: Vec<usize> = batches.iter().map(Batch::size).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(batches[0].number, 1);
        assert_eq!(batches[2].number, 3);
    }

    #[test]
    fn batch_size_one_yields_suite_len_batches() {
        let batches = partition(&ids(5), &BatchSizing::Uniform { size: 1 }, 3).unwrap();
        assert_eq!(batches.len(), 5);
    }

    #[test]
    fn oversized_batch_yields_one_batch() {
        let batches = partition(&ids(3), &BatchSizing::Uniform { size: 50 }, 3).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].size(), 3);
    }

    #[test]
    fn every_id_in_exactly_one_batch() {
        let all = ids(17);
        let batches = partition(&all, &BatchSizing::Uniform { size: 5 }, 3).unwrap();
        let mut seen = HashSet::new();
        for batch in &batches {
            for id in &batch.test_ids {
                assert!(seen.insert(id.clone()), "{id} assigned twice");
            }
        }
        assert_eq!(seen.len(), all.len());
        let total: usize = batches.iter().map(Batch::size).sum();
        assert_eq!(total, all.len());
    }

    #[test]
    fn custom_sizes_used_in_order() {
        let batches = partition(&ids(6), &BatchSizing::Custom { sizes: vec![1, 3, 2] }, 3).unwrap();
        assert_eq!(batches[0].test_ids, vec!["t1"]);
        assert_eq!(batches[1].test_ids, vec!["t2", "t3", "t4"]);
        assert_eq!(batches[2].test_ids, vec!["t5", "t6"]);
    }

    #[test]
    fn custom_sizes_must_sum_to_suite_len() {
        let err = partition(&ids(6), &BatchSizing::Custom { sizes: vec![2, 2] }, 3);
        assert!(matches!(err, Err(Error::Config(_))));
        let err = partition(&ids(6), &BatchSizing::Custom { sizes: vec![4, 4] }, 3);
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn request_validation_bounds() {
        let suite_len = 10;
        assert!(RunRequest::new("m", "v").validate(suite_len).is_ok());
        assert!(RunRequest::new("", "v").validate(suite_len).is_err());
        assert!(RunRequest::new("m", "v")
            .with_temperature(2.5)
            .validate(suite_len)
            .is_err());
        assert!(RunRequest::new("m", "v")
            .with_queue_size(21)
            .validate(suite_len)
            .is_err());
        assert!(RunRequest::new("m", "v")
            .with_queue_size(0)
            .validate(suite_len)
            .is_err());
        assert!(RunRequest::new("m", "v")
            .with_custom_sizes(vec![5, 5])
            .validate(suite_len)
            .is_ok());
        assert!(RunRequest::new("m", "v")
            .with_custom_sizes(vec![5, 4])
            .validate(suite_len)
            .is_err());
    }

    #[test]
    fn retry_replaces_responses() {
        let mut batch = Batch::new(1, ids(2), 3);
        batch.mark_running();
        let mut partial = BTreeMap::new();
        partial.insert("t1".to_string(), "code".to_string());
        batch.responses = partial;
        batch.mark_retrying(&Error::Transport("reset".into()));
        assert!(batch.responses.is_empty());
        assert_eq!(batch.retry_count, 1);
        assert_eq!(batch.status, BatchStatus::Retrying);
    }

    #[test]
    fn retry_budget_enforced() {
        let mut batch = Batch::new(1, ids(1), 2);
        assert!(batch.can_retry());
        batch.mark_retrying(&Error::Transport("1".into()));
        batch.mark_retrying(&Error::Transport("2".into()));
        assert!(!batch.can_retry());
    }

    #[test]
    fn terminal_run_is_frozen() {
        let batches = partition(&ids(2), &BatchSizing::Uniform { size: 2 }, 3).unwrap();
        let mut run = Run::new(RunId::new(), RunRequest::new("m", "v"), batches, Utc::now());
        run.mark_cancelled();
        assert_eq!(run.status, RunStatus::Cancelled);
        run.mark_completed(ArtifactId::from("later"));
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(run.artifact_id.is_none());
    }
}
