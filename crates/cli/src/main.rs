//! docbench CLI
//!
//! Evaluate response files against the test suite, inspect suite
//! statistics, and compare result collections.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "docbench")]
#[command(author, version, about = "Jac documentation benchmark toolkit")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the test suite definition
    #[arg(long, global = true, default_value = "tests.json")]
    suite: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a responses file and print the score report
    #[command(alias = "e")]
    Eval {
        /// JSON file mapping test ids to code strings
        file: PathBuf,

        /// External syntax-check command (e.g. "jac"); soft checks only
        /// when omitted
        #[arg(long)]
        check_cmd: Option<String>,
    },

    /// Show suite statistics by level and category
    Stats,

    /// Compare two collections in a result store
    Compare {
        /// Result store directory
        #[arg(long, default_value = "results")]
        store: PathBuf,

        left: String,
        right: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Eval { file, check_cmd } => commands::eval::run(&cli.suite, &file, check_cmd).await,
        Commands::Stats => commands::stats::run(&cli.suite),
        Commands::Compare { store, left, right } => {
            commands::compare::run(&store, &left, &right).await
        }
    }
}
