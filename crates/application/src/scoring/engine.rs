//! The deterministic scorer.
//!
//! Pure function of (artifact, suite): for every suite case the response
//! is scored through a fixed penalty pipeline — required patterns, then
//! forbidden patterns, then soft syntax rules, then the external compile
//! check against whatever score remains — flooring at zero after each
//! stage. Pattern matching is case-sensitive and literal.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use docbench_domain::{
    eval::round2, Artifact, CategoryStats, EvalResult, EvalSummary, LevelStats, PenaltyBreakdown,
    TestCase, TestScore, TestSuite,
};

use super::checker::SyntaxChecker;
use super::syntax::soft_syntax_violations;

/// Penalty fractions applied per stage.
#[derive(Debug, Clone, Copy)]
pub struct ScorerConfig {
    /// Fraction of points subtracted per forbidden-pattern occurrence.
    pub forbidden_fraction: f64,
    /// Fraction of points subtracted per soft syntax violation.
    pub syntax_fraction: f64,
    /// Fraction of the remaining score subtracted on compile-check failure.
    pub compile_fraction: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            forbidden_fraction: 0.25,
            syntax_fraction: 0.05,
            compile_fraction: 1.0,
        }
    }
}

/// Deterministic per-artifact evaluator.
pub struct Scorer {
    config: ScorerConfig,
    checker: Arc<dyn SyntaxChecker>,
}

impl Scorer {
    pub fn new(checker: Arc<dyn SyntaxChecker>) -> Self {
        Self {
            config: ScorerConfig::default(),
            checker,
        }
    }

    pub fn with_config(checker: Arc<dyn SyntaxChecker>, config: ScorerConfig) -> Self {
        Self { config, checker }
    }

    /// Evaluate an artifact against the suite.
    #[instrument(skip(self, artifact, suite), fields(artifact_id = %artifact.id))]
    pub async fn score(&self, artifact: &Artifact, suite: &TestSuite) -> EvalResult {
        let mut scores = Vec::with_capacity(suite.len());
        let mut tests_completed = 0;

        for case in suite.cases() {
            // Cases absent from the response map were not part of the run
            // (prefix-filtered suites); cases present with empty code were
            // part of it and score zero with the missing penalty.
            let Some(code) = artifact.responses.get(&case.id) else {
                continue;
            };
            if !code.trim().is_empty() {
                tests_completed += 1;
            }
            scores.push(self.score_case(case, code).await);
        }

        let tests_total = scores.len();
        let summary = summarize(&scores, tests_completed, tests_total);
        debug!(
            overall = summary.overall_percentage,
            tests_completed, "artifact scored"
        );

        EvalResult {
            artifact_id: artifact.id.clone(),
            metadata: artifact.metadata.clone(),
            scores,
            summary,
        }
    }

    /// Score one response through the fixed penalty pipeline.
    async fn score_case(&self, case: &TestCase, code: &str) -> TestScore {
        let points = case.points as f64;
        let mut penalties = PenaltyBreakdown::default();
        let mut feedback = Vec::new();

        if code.trim().is_empty() {
            penalties.missing = points;
            feedback.push("no response".to_string());
            return TestScore {
                test_id: case.id.clone(),
                category: case.category.clone(),
                level: case.level,
                score: 0.0,
                max_score: points,
                penalties,
                feedback,
            };
        }

        // Required patterns: partial credit by fraction found.
        let required: Vec<&String> = case.required.iter().filter(|p| !p.is_empty()).collect();
        let found = required.iter().filter(|p| code.contains(p.as_str())).count();
        let partial = if required.is_empty() {
            points
        } else {
            (found as f64 / required.len() as f64) * points
        };
        penalties.required = points - partial;
        for pattern in &required {
            if !code.contains(pattern.as_str()) {
                feedback.push(format!("missing required element: '{pattern}'"));
            }
        }
        let mut score = partial;

        // Forbidden patterns: every occurrence costs a fixed fraction.
        let mut occurrences = 0;
        for pattern in case.forbidden.iter().filter(|p| !p.is_empty()) {
            let count = code.matches(pattern.as_str()).count();
            if count > 0 {
                occurrences += count;
                feedback.push(format!("contains forbidden element: '{pattern}' x{count}"));
            }
        }
        penalties.forbidden = occurrences as f64 * self.config.forbidden_fraction * points;
        score = (score - penalties.forbidden).max(0.0);

        // Soft syntax rules.
        let violations = soft_syntax_violations(code);
        penalties.syntax = violations.len() as f64 * self.config.syntax_fraction * points;
        score = (score - penalties.syntax).max(0.0);
        feedback.extend(violations);

        // Hard compile check against the remainder.
        let outcome = self.checker.check(code).await;
        if !outcome.ok {
            penalties.jac_check = score * self.config.compile_fraction;
            score = (score - penalties.jac_check).max(0.0);
            feedback.push(format!("compile check failed: {} errors", outcome.errors.len()));
            feedback.extend(outcome.errors);
        }

        TestScore {
            test_id: case.id.clone(),
            category: case.category.clone(),
            level: case.level,
            score,
            max_score: points,
            penalties,
            feedback,
        }
    }
}

/// Aggregate per-test scores into the reported summary, rounding at the
/// edge only.
fn summarize(scores: &[TestScore], tests_completed: usize, tests_total: usize) -> EvalSummary {
    struct Bucket {
        score: f64,
        max: f64,
        count: usize,
        penalties: PenaltyBreakdown,
    }

    let mut categories: BTreeMap<String, Bucket> = BTreeMap::new();
    let mut levels: BTreeMap<u32, Bucket> = BTreeMap::new();
    let mut total_score = 0.0;
    let mut total_max = 0.0;
    let mut total_penalties = PenaltyBreakdown::default();

    for test in scores {
        total_score += test.score;
        total_max += test.max_score;
        total_penalties.add(&test.penalties);

        let category = categories.entry(test.category.clone()).or_insert(Bucket {
            score: 0.0,
            max: 0.0,
            count: 0,
            penalties: PenaltyBreakdown::default(),
        });
        category.score += test.score;
        category.max += test.max_score;
        category.count += 1;
        category.penalties.add(&test.penalties);

        let level = levels.entry(test.level).or_insert(Bucket {
            score: 0.0,
            max: 0.0,
            count: 0,
            penalties: PenaltyBreakdown::default(),
        });
        level.score += test.score;
        level.max += test.max_score;
        level.count += 1;
    }

    let percentage = |score: f64, max: f64| {
        if max > 0.0 {
            round2(score / max * 100.0)
        } else {
            0.0
        }
    };

    EvalSummary {
        total_score: round2(total_score),
        total_max: round2(total_max),
        overall_percentage: percentage(total_score, total_max),
        tests_completed,
        tests_total,
        category_breakdown: categories
            .into_iter()
            .map(|(name, b)| {
                (
                    name,
                    CategoryStats {
                        score: round2(b.score),
                        max: round2(b.max),
                        percentage: percentage(b.score, b.max),
                        count: b.count,
                        penalties: b.penalties.rounded(),
                    },
                )
            })
            .collect(),
        level_breakdown: levels
            .into_iter()
            .map(|(level, b)| {
                (
                    level,
                    LevelStats {
                        score: round2(b.score),
                        max: round2(b.max),
                        percentage: percentage(b.score, b.max),
                        count: b.count,
                    },
                )
            })
            .collect(),
        total_penalties: total_penalties.rounded(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::checker::{CheckOutcome, PassChecker};
    use async_trait::async_trait;

    struct FailChecker;

    #[async_trait]
    impl SyntaxChecker for FailChecker {
        async fn check(&self, _code: &str) -> CheckOutcome {
            CheckOutcome::fail(vec!["Error: bad syntax".into()])
        }
    }

    fn case(id: &str, points: u32, required: &[&str], forbidden: &[&str]) -> TestCase {
        TestCase {
            id: id.into(),
            category: "Basic".into(),
            level: 1,
            points,
            task: "task".into(),
            required: required.iter().map(|s| s.to_string()).collect(),
            forbidden: forbidden.iter().map(|s| s.to_string()).collect(),
            hints: vec![],
        }
    }

    fn scorer() -> Scorer {
        Scorer::new(Arc::new(PassChecker))
    }

    #[tokio::test]
    async fn full_credit_when_all_required_found() {
        let score = scorer().score_case(&case("t", 10, &["A"], &[]), "A").await;
        assert_eq!(score.score, 10.0);
        assert_eq!(score.penalties.required, 0.0);
    }

    #[tokio::test]
    async fn partial_credit_by_fraction_found() {
        let score = scorer().score_case(&case("t", 20, &["B", "C"], &[]), "B").await;
        assert_eq!(score.score, 10.0);
        assert_eq!(score.penalties.required, 10.0);
    }

    #[tokio::test]
    async fn empty_response_scores_zero_with_missing_penalty() {
        let score = scorer().score_case(&case("t", 30, &["D"], &[]), "").await;
        assert_eq!(score.score, 0.0);
        assert_eq!(score.penalties.missing, 30.0);
    }

    #[tokio::test]
    async fn each_forbidden_occurrence_costs_a_quarter() {
        let score = scorer().score_case(&case("t", 10, &["A"], &["X"]), "A X X").await;
        assert_eq!(score.penalties.forbidden, 5.0);
        assert_eq!(score.score, 5.0);
    }

    #[tokio::test]
    async fn score_floors_at_zero() {
        let code = "A X X X X X X X X X";
        let score = scorer().score_case(&case("t", 10, &["A"], &["X"]), code).await;
        assert_eq!(score.score, 0.0);
        assert!(score.penalties.forbidden > 10.0);
    }

    #[tokio::test]
    async fn compile_failure_wipes_remaining_score() {
        let s = Scorer::new(Arc::new(FailChecker));
        let score = s.score_case(&case("t", 10, &["A"], &[]), "A").await;
        assert_eq!(score.penalties.jac_check, 10.0);
        assert_eq!(score.score, 0.0);
    }

    #[tokio::test]
    async fn no_required_patterns_grants_full_base() {
        let score = scorer().score_case(&case("t", 10, &[], &[]), "anything;").await;
        assert_eq!(score.score, 10.0);
    }

    #[tokio::test]
    async fn soft_syntax_violation_costs_five_percent() {
        // Missing closing brace: one violation at 5% of 20 points.
        let score = scorer()
            .score_case(&case("t", 20, &["entry"], &[]), "with entry {")
            .await;
        assert_eq!(score.penalties.syntax, 1.0);
        assert_eq!(score.score, 19.0);
    }

    #[tokio::test]
    async fn adding_absent_required_pattern_never_raises_score() {
        let base = scorer().score_case(&case("t", 12, &["A"], &[]), "A").await;
        let tightened = scorer()
            .score_case(&case("t", 12, &["A", "ZZZ"], &[]), "A")
            .await;
        assert!(tightened.score <= base.score);
    }
}
