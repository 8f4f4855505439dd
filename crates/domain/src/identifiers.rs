//! Identifier types for the benchmark harness.
//!
//! Run ids are opaque 16-byte values rendered as 32 hex characters.
//! Artifact ids are human-readable and encode model, variant, and
//! creation time. Collection names are user-chosen and validated.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::Error;

/// Opaque identifier for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a fresh random run id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.simple())
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uuid::parse_str(&s).map(Self).map_err(de::Error::custom)
    }
}

/// Identifier for a persisted artifact: `<model-slug>-<variant>-YYYYMMDD_HHMMSS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Derive an artifact id from the run's model, variant, and creation time.
    pub fn generate(model: &str, variant: &str, at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}-{}-{}",
            model_slug(model),
            variant,
            at.format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ArtifactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Filesystem-safe slug for a model id: slashes and whitespace become dashes.
pub fn model_slug(model: &str) -> String {
    model
        .chars()
        .map(|c| if c == '/' || c.is_whitespace() { '-' } else { c })
        .collect()
}

/// Validated collection name: 1-64 characters from `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() || name.len() > 64 {
            return Err(Error::Config(format!(
                "collection name must be 1-64 characters, got {}",
                name.len()
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Config(format!(
                "collection name '{name}' contains characters outside [A-Za-z0-9_-]"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CollectionName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for CollectionName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_id_is_32_hex_chars() {
        let id = RunId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn run_id_round_trips_through_serde() {
        let id = RunId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.contains(&id.to_string()));
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn run_id_parses_its_own_display() {
        let id = RunId::new();
        let back: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn artifact_id_encodes_model_variant_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 9).unwrap();
        let id = ArtifactId::generate("openai/gpt-4o", "core", at);
        assert_eq!(id.as_str(), "openai-gpt-4o-core-20240305_143009");
    }

    #[test]
    fn model_slug_replaces_separators() {
        assert_eq!(model_slug("a/b c"), "a-b-c");
        assert_eq!(model_slug("plain"), "plain");
    }

    #[test]
    fn collection_name_validation() {
        assert!(CollectionName::new("baseline_runs-1").is_ok());
        assert!(CollectionName::new("").is_err());
        assert!(CollectionName::new("a".repeat(65)).is_err());
        assert!(CollectionName::new("has space").is_err());
        assert!(CollectionName::new("sla/sh").is_err());
    }
}
