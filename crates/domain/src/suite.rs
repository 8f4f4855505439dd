//! Test suite definitions.
//!
//! A suite is an ordered, immutable list of test cases loaded once from a
//! JSON definition. Field names match the on-disk `tests.json` schema.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::{Error, Result};

/// One coding task in the suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub category: String,
    pub level: u32,
    pub points: u32,
    pub task: String,
    /// Substrings that must appear in the response, in definition order.
    #[serde(rename = "required_elements", default)]
    pub required: Vec<String>,
    /// Substrings that must not appear in the response.
    #[serde(rename = "forbidden_elements", default)]
    pub forbidden: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
}

/// Ordered, immutable collection of test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    name: String,
    cases: Vec<TestCase>,
}

impl TestSuite {
    /// Build a suite, validating case uniqueness and bounds.
    pub fn new(name: impl Into<String>, cases: Vec<TestCase>) -> Result<Self> {
        if cases.is_empty() {
            return Err(Error::Config("test suite is empty".into()));
        }
        let mut seen = HashSet::new();
        for case in &cases {
            if case.id.is_empty() {
                return Err(Error::Config("test case with empty id".into()));
            }
            if !seen.insert(case.id.as_str()) {
                return Err(Error::Config(format!("duplicate test case id '{}'", case.id)));
            }
            if case.level < 1 {
                return Err(Error::Config(format!(
                    "test case '{}' has level {}, minimum is 1",
                    case.id, case.level
                )));
            }
            if case.points < 1 {
                return Err(Error::Config(format!(
                    "test case '{}' has points {}, minimum is 1",
                    case.id, case.points
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            cases,
        })
    }

    /// Load a suite from a JSON array of test cases.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let cases: Vec<TestCase> = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid suite definition: {e}")))?;
        Self::new(name, cases)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Sum of points over all cases.
    pub fn total_points(&self) -> u32 {
        self.cases.iter().map(|c| c.points).sum()
    }

    /// Case ids in suite order.
    pub fn ids(&self) -> Vec<String> {
        self.cases.iter().map(|c| c.id.clone()).collect()
    }

    /// Restrict the suite to its first `limit` cases, preserving order.
    pub fn with_limit(&self, limit: Option<usize>) -> Result<Self> {
        match limit {
            None => Ok(self.clone()),
            Some(0) => Err(Error::Config("test limit must be at least 1".into())),
            Some(n) => {
                let cases = self.cases.iter().take(n).cloned().collect();
                Self::new(self.name.clone(), cases)
            }
        }
    }
}
