//! `docbench stats` — suite composition by level and category.

use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;

use super::load_suite;

pub fn run(suite_path: &Path) -> Result<()> {
    let suite = load_suite(suite_path)?;

    println!("Total tests: {}", suite.len());
    println!("Total possible points: {}", suite.total_points());
    println!();

    let mut levels: BTreeMap<u32, (usize, u32)> = BTreeMap::new();
    let mut categories: BTreeMap<&str, (usize, u32)> = BTreeMap::new();
    for case in suite.cases() {
        let level = levels.entry(case.level).or_default();
        level.0 += 1;
        level.1 += case.points;
        let category = categories.entry(case.category.as_str()).or_default();
        category.0 += 1;
        category.1 += case.points;
    }

    println!("{}", "Breakdown by level:".bold());
    for (level, (count, points)) in &levels {
        println!("  Level {level}: {count} tests, {points} points");
    }
    println!();

    println!("{}", "Breakdown by category:".bold());
    for (category, (count, points)) in &categories {
        println!("  {category}: {count} tests, {points} points");
    }
    Ok(())
}
