//! Artifact collections.
//!
//! A collection is a named, ordered set of artifact references used for
//! cross-run aggregation and comparison. Members may be removed, never
//! mutated; the denormalized metadata comes from the first member at
//! creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactMetadata;
use crate::identifiers::{ArtifactId, CollectionName};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: CollectionName,
    pub artifact_ids: Vec<ArtifactId>,
    pub created_at: DateTime<Utc>,
    /// Metadata of the first member when the collection was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ArtifactMetadata>,
}

impl Collection {
    pub fn new(
        name: CollectionName,
        artifact_ids: Vec<ArtifactId>,
        metadata: Option<ArtifactMetadata>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut deduped = Vec::with_capacity(artifact_ids.len());
        for id in artifact_ids {
            if !deduped.contains(&id) {
                deduped.push(id);
            }
        }
        Self {
            name,
            artifact_ids: deduped,
            created_at,
            metadata,
        }
    }

    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.artifact_ids.contains(id)
    }

    /// Add a member; duplicates are ignored.
    pub fn add(&mut self, id: ArtifactId) {
        if !self.contains(&id) {
            self.artifact_ids.push(id);
        }
    }

    /// Remove a member; returns whether it was present.
    pub fn remove(&mut self, id: &ArtifactId) -> bool {
        let before = self.artifact_ids.len();
        self.artifact_ids.retain(|a| a != id);
        self.artifact_ids.len() != before
    }

    pub fn len(&self) -> usize {
        self.artifact_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifact_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> CollectionName {
        CollectionName::new(s).unwrap()
    }

    #[test]
    fn add_is_idempotent() {
        let mut c = Collection::new(name("baseline"), vec![], None, Utc::now());
        c.add(ArtifactId::from("a1"));
        c.add(ArtifactId::from("a1"));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn creation_dedups_members() {
        let c = Collection::new(
            name("baseline"),
            vec![ArtifactId::from("a1"), ArtifactId::from("a2"), ArtifactId::from("a1")],
            None,
            Utc::now(),
        );
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn remove_reports_presence() {
        let mut c = Collection::new(name("x"), vec![ArtifactId::from("a1")], None, Utc::now());
        assert!(c.remove(&ArtifactId::from("a1")));
        assert!(!c.remove(&ArtifactId::from("a1")));
        assert!(c.is_empty());
    }
}
