//! CLI subcommands.

pub mod compare;
pub mod eval;
pub mod stats;

use anyhow::{Context, Result};
use std::path::Path;

use docbench_domain::TestSuite;

/// Load the suite definition from disk.
pub fn load_suite(path: &Path) -> Result<TestSuite> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read suite file {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "suite".to_string());
    TestSuite::from_json(name, &json).context("invalid suite definition")
}
