//! Collection statistics and pairwise comparison.
//!
//! Works over the evaluation summaries of a collection's members. The
//! standard deviation uses the population formula and is reported as 0
//! for collections with fewer than two artifacts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use docbench_domain::{eval::round2, EvalSummary};

/// Aggregate statistics for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub file_count: usize,
    /// Mean of per-artifact overall percentages.
    pub mean_percentage: f64,
    /// Population standard deviation of overall percentages.
    pub std_dev: f64,
    /// Mean percentage per category across members that have it.
    pub category_means: BTreeMap<String, f64>,
}

/// Per-category comparison entry. `delta` is right minus left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

/// Pairwise comparison of two collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionComparison {
    pub left: String,
    pub right: String,
    pub left_stats: CollectionStats,
    pub right_stats: CollectionStats,
    pub categories: BTreeMap<String, CategoryDelta>,
}

/// Compute statistics over a collection's member summaries.
pub fn collection_stats(summaries: &[EvalSummary]) -> CollectionStats {
    let percentages: Vec<f64> = summaries.iter().map(|s| s.overall_percentage).collect();
    let mean_percentage = mean(&percentages);
    let std_dev = if percentages.len() >= 2 {
        population_std_dev(&percentages, mean_percentage)
    } else {
        0.0
    };

    let mut per_category: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for summary in summaries {
        for (name, stats) in &summary.category_breakdown {
            per_category
                .entry(name.clone())
                .or_default()
                .push(stats.percentage);
        }
    }

    CollectionStats {
        file_count: summaries.len(),
        mean_percentage: round2(mean_percentage),
        std_dev: round2(std_dev),
        category_means: per_category
            .into_iter()
            .map(|(name, values)| (name, round2(mean(&values))))
            .collect(),
    }
}

/// Compare two collections; category deltas are right minus left.
pub fn compare(
    left_name: &str,
    left: &[EvalSummary],
    right_name: &str,
    right: &[EvalSummary],
) -> CollectionComparison {
    let left_stats = collection_stats(left);
    let right_stats = collection_stats(right);

    let names: BTreeSet<String> = left_stats
        .category_means
        .keys()
        .chain(right_stats.category_means.keys())
        .cloned()
        .collect();

    let categories = names
        .into_iter()
        .map(|name| {
            let l = left_stats.category_means.get(&name).copied();
            let r = right_stats.category_means.get(&name).copied();
            let delta = match (l, r) {
                (Some(l), Some(r)) => Some(round2(r - l)),
                _ => None,
            };
            (
                name,
                CategoryDelta {
                    left: l,
                    right: r,
                    delta,
                },
            )
        })
        .collect();

    CollectionComparison {
        left: left_name.to_string(),
        right: right_name.to_string(),
        left_stats,
        right_stats,
        categories,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
