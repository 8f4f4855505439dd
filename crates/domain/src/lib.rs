//! Core domain types for the docbench benchmark harness.
//!
//! This crate holds the pure data model: test suites, run requests and
//! their lifecycle, artifacts, evaluation results, collections, events,
//! identifiers, and the error taxonomy. It has no I/O and no runtime
//! dependencies; everything here is owned by the orchestration layer and
//! mutated only through the transition methods defined on each type.

pub mod artifact;
pub mod collection;
pub mod errors;
pub mod eval;
pub mod events;
pub mod identifiers;
pub mod run;
pub mod suite;
pub mod variant;

pub use artifact::{Artifact, ArtifactMetadata};
pub use collection::Collection;
pub use errors::{Error, Result};
pub use eval::{CategoryStats, EvalResult, EvalSummary, LevelStats, PenaltyBreakdown, TestScore};
pub use events::{Event, EventKind, Topic};
pub use identifiers::{ArtifactId, CollectionName, RunId};
pub use run::{Batch, BatchSizing, BatchStatus, Run, RunRequest, RunStatus};
pub use suite::{TestCase, TestSuite};
pub use variant::Variant;
