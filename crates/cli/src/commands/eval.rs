//! `docbench eval` — score a responses file against the suite.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use docbench_application::{PassChecker, Scorer, SyntaxChecker};
use docbench_domain::{Artifact, ArtifactId, ArtifactMetadata, EvalResult, RunId};
use docbench_infrastructure::CommandSyntaxChecker;

use super::load_suite;

pub async fn run(suite_path: &Path, file: &Path, check_cmd: Option<String>) -> Result<()> {
    let suite = load_suite(suite_path)?;

    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read responses file {}", file.display()))?;
    let responses = parse_responses_file(&raw)?;

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "responses".to_string());

    let missing: Vec<String> = responses
        .iter()
        .filter(|(_, code)| code.is_empty())
        .map(|(id, _)| id.clone())
        .collect();
    let artifact = Artifact {
        id: ArtifactId::from(stem.as_str()),
        run_id: RunId::new(),
        metadata: ArtifactMetadata {
            model: "local".to_string(),
            variant: stem,
            suite: suite.name().to_string(),
            total_tests: responses.len(),
            num_batches: 1,
            batch_size: Some(responses.len()),
            custom_batch_sizes: None,
            temperature: 0.0,
            max_tokens: 0,
            created_at: Utc::now(),
            missing,
        },
        responses,
    };

    let checker: Arc<dyn SyntaxChecker> = match check_cmd {
        Some(program) => Arc::new(CommandSyntaxChecker::new(program)),
        None => Arc::new(PassChecker),
    };
    let result = Scorer::new(checker).score(&artifact, &suite).await;
    print_report(&result);
    Ok(())
}

/// Accept either a bare id→code map or the `{metadata, responses}`
/// wrapper written by the harness.
fn parse_responses_file(raw: &str) -> Result<BTreeMap<String, String>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("responses file is not valid JSON")?;
    let object = match value.get("responses") {
        Some(inner) => inner.clone(),
        None => value,
    };
    let Some(map) = object.as_object() else {
        bail!("responses file must contain a JSON object of test id to code");
    };

    let mut responses = BTreeMap::new();
    for (id, code) in map {
        let Some(code) = code.as_str() else {
            bail!("response for '{id}' is not a string");
        };
        responses.insert(id.clone(), code.to_string());
    }
    Ok(responses)
}

fn print_report(result: &EvalResult) {
    let summary = &result.summary;

    println!("{}", "BENCHMARK RESULTS".bold());
    println!("{}", "=".repeat(70));
    println!(
        "Total Score:   {:.2}/{:.0} ({:.2}%)",
        summary.total_score, summary.total_max, summary.overall_percentage
    );
    println!(
        "Tests:         {}/{} completed",
        summary.tests_completed, summary.tests_total
    );
    println!();

    println!("{}", "CATEGORY BREAKDOWN".bold());
    println!("{}", "-".repeat(70));
    for (category, stats) in &summary.category_breakdown {
        let line = format!(
            "{:<24} {:>7.2}/{:<5.0} ({:>6.2}%) [{} tests]",
            category, stats.score, stats.max, stats.percentage, stats.count
        );
        println!("{}", colorize_by_percentage(&line, stats.percentage));
    }
    println!();

    println!("{}", "DIFFICULTY LEVEL BREAKDOWN".bold());
    println!("{}", "-".repeat(70));
    for (level, stats) in &summary.level_breakdown {
        let line = format!(
            "Level {:<18} {:>7.2}/{:<5.0} ({:>6.2}%) [{} tests]",
            level, stats.score, stats.max, stats.percentage, stats.count
        );
        println!("{}", colorize_by_percentage(&line, stats.percentage));
    }
    println!();

    let penalties = &summary.total_penalties;
    println!("{}", "PENALTIES".bold());
    println!("{}", "-".repeat(70));
    println!(
        "missing {:.2}  required {:.2}  forbidden {:.2}  syntax {:.2}  jac_check {:.2}",
        penalties.missing, penalties.required, penalties.forbidden, penalties.syntax,
        penalties.jac_check
    );
}

fn colorize_by_percentage(line: &str, percentage: f64) -> colored::ColoredString {
    if percentage >= 80.0 {
        line.green()
    } else if percentage >= 50.0 {
        line.yellow()
    } else {
        line.red()
    }
}
