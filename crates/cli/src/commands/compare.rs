//! `docbench compare` — compare two collections from a result store.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;

use docbench_application::stats;
use docbench_domain::{CollectionName, EvalSummary};
use docbench_infrastructure::{FsStore, Store};

pub async fn run(store_dir: &Path, left: &str, right: &str) -> Result<()> {
    let store = FsStore::new(store_dir);

    let left_summaries = collection_summaries(&store, left).await?;
    let right_summaries = collection_summaries(&store, right).await?;
    let comparison = stats::compare(left, &left_summaries, right, &right_summaries);

    println!("{}", "COLLECTION COMPARISON".bold());
    println!("{}", "=".repeat(70));
    for (label, stats) in [
        (&comparison.left, &comparison.left_stats),
        (&comparison.right, &comparison.right_stats),
    ] {
        println!(
            "{:<24} mean {:>6.2}%  std dev {:>6.2}  ({} files)",
            label, stats.mean_percentage, stats.std_dev, stats.file_count
        );
    }
    println!();

    println!("{}", "PER-CATEGORY DELTA (right - left)".bold());
    println!("{}", "-".repeat(70));
    for (category, delta) in &comparison.categories {
        let left = delta
            .left
            .map(|v| format!("{v:>6.2}"))
            .unwrap_or_else(|| "     -".to_string());
        let right = delta
            .right
            .map(|v| format!("{v:>6.2}"))
            .unwrap_or_else(|| "     -".to_string());
        match delta.delta {
            Some(d) if d > 0.0 => {
                let rendered = format!("+{d:.2}");
                println!("{category:<24} {left}  {right}  {}", rendered.as_str().green());
            }
            Some(d) if d < 0.0 => {
                let rendered = format!("{d:.2}");
                println!("{category:<24} {left}  {right}  {}", rendered.as_str().red());
            }
            Some(_) => println!("{category:<24} {left}  {right}   0.00"),
            None => println!("{category:<24} {left}  {right}      -"),
        }
    }
    Ok(())
}

/// Load evaluation summaries for every member of a collection.
async fn collection_summaries(store: &FsStore, name: &str) -> Result<Vec<EvalSummary>> {
    let name = CollectionName::new(name)?;
    let collection = store
        .read_collection(&name)
        .await
        .with_context(|| format!("collection '{name}' not found in store"))?;

    let mut summaries = Vec::with_capacity(collection.len());
    for id in &collection.artifact_ids {
        match store.read_eval_result(id).await? {
            Some(result) => summaries.push(result.summary),
            None => bail!("artifact {id} has no evaluation; run the harness evaluator first"),
        }
    }
    Ok(summaries)
}
