//! Progress events published by the harness.
//!
//! Every stage of a run publishes typed events on named topics. Events
//! carry a per-topic monotonic sequence number so late subscribers can
//! resume from a cursor without gaps.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::identifiers::{ArtifactId, RunId};

/// Named event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Per-run progress: `run/<run_id>`.
    Run(RunId),
    /// Manual batch reruns: `batch_rerun/<run_id>`.
    BatchRerun(RunId),
    /// Cross-run events: run completions and evaluation progress.
    Global,
}

impl Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(id) => write!(f, "run/{id}"),
            Self::BatchRerun(id) => write!(f, "batch_rerun/{id}"),
            Self::Global => f.write_str("global"),
        }
    }
}

/// Event kinds with their payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        total_batches: usize,
        total_tests: usize,
    },
    BatchStarted {
        batch: u32,
    },
    BatchRetry {
        batch: u32,
        attempt: u32,
        reason: String,
    },
    BatchCompleted {
        batch: u32,
        responses: usize,
    },
    BatchFailed {
        batch: u32,
        error: String,
    },
    RunCompleted {
        artifact_id: ArtifactId,
    },
    RunFailed {
        error: String,
    },
    RunCancelled,
    EvaluationStarted {
        artifact_id: ArtifactId,
    },
    EvaluationCompleted {
        artifact_id: ArtifactId,
        overall_percentage: f64,
    },
    EvaluationFailed {
        artifact_id: ArtifactId,
        error: String,
    },
    /// Marker inserted when a subscriber queue overflowed; `dropped`
    /// counts the events lost since the last delivered one.
    Lag {
        dropped: u64,
    },
}

impl EventKind {
    /// Terminal run events are never dropped from subscriber queues.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted { .. } | Self::RunFailed { .. } | Self::RunCancelled
        )
    }

    pub fn is_lag(&self) -> bool {
        matches!(self, Self::Lag { .. })
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence within the topic, starting at 1.
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<u32>,
    pub kind: EventKind,
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names() {
        let id = RunId::new();
        assert_eq!(Topic::Run(id).to_string(), format!("run/{id}"));
        assert_eq!(Topic::BatchRerun(id).to_string(), format!("batch_rerun/{id}"));
        assert_eq!(Topic::Global.to_string(), "global");
    }

    #[test]
    fn terminal_kinds() {
        assert!(EventKind::RunCancelled.is_terminal());
        assert!(EventKind::RunFailed { error: "x".into() }.is_terminal());
        assert!(EventKind::RunCompleted {
            artifact_id: ArtifactId::from("a")
        }
        .is_terminal());
        assert!(!EventKind::BatchStarted { batch: 1 }.is_terminal());
        assert!(!EventKind::Lag { dropped: 3 }.is_terminal());
    }

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = Event {
            seq: 7,
            run_id: Some(RunId::new()),
            batch: Some(2),
            kind: EventKind::BatchRetry {
                batch: 2,
                attempt: 1,
                reason: "transport error: reset".into(),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"batch_retry\""));
        assert!(json.contains("\"seq\":7"));
    }
}
