//! Run artifacts.
//!
//! An artifact is the immutable output of a completed run: the response
//! map plus a metadata snapshot of the run's parameters. Missing test ids
//! are recorded explicitly with empty code so the artifact always carries
//! one entry per suite case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::identifiers::{ArtifactId, RunId};
use crate::run::{BatchSizing, Run};

/// Metadata snapshot persisted alongside the response map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model: String,
    pub variant: String,
    pub suite: String,
    pub total_tests: usize,
    pub num_batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_batch_sizes: Option<Vec<usize>>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub created_at: DateTime<Utc>,
    /// Test ids whose batches failed; their responses are empty strings.
    pub missing: Vec<String>,
}

/// Immutable output of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub run_id: RunId,
    /// One entry per suite case id, in sorted order.
    pub responses: BTreeMap<String, String>,
    pub metadata: ArtifactMetadata,
}

impl Artifact {
    /// Assemble the artifact for a run, merging batch responses and
    /// filling unanswered ids with the no-response marker.
    pub fn from_run(id: ArtifactId, run: &Run, suite_name: &str, created_at: DateTime<Utc>) -> Self {
        let mut responses = BTreeMap::new();
        let mut missing = Vec::new();

        for batch in &run.batches {
            for test_id in &batch.test_ids {
                match batch.responses.get(test_id) {
                    Some(code) if !code.is_empty() => {
                        responses.insert(test_id.clone(), code.clone());
                    }
                    _ => {
                        responses.insert(test_id.clone(), String::new());
                        missing.push(test_id.clone());
                    }
                }
            }
        }

        let (batch_size, custom_batch_sizes) = match &run.request.sizing {
            BatchSizing::Uniform { size } => (Some(*size), None),
            BatchSizing::Custom { sizes } => (None, Some(sizes.clone())),
        };

        Self {
            id,
            run_id: run.id,
            responses,
            metadata: ArtifactMetadata {
                model: run.request.model.clone(),
                variant: run.request.variant.clone(),
                suite: suite_name.to_string(),
                total_tests: run.total_tests(),
                num_batches: run.batches.len(),
                batch_size,
                custom_batch_sizes,
                temperature: run.request.temperature,
                max_tokens: run.request.max_tokens,
                created_at,
                missing,
            },
        }
    }
}
