//! External syntax-check adapter.
//!
//! Writes the candidate code to a temporary file and runs a check command
//! against it under a hard timeout. A missing checker binary counts as a
//! pass (validation is skipped); a timeout counts as a fail.

use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use docbench_application::{CheckOutcome, SyntaxChecker};

/// Syntax checker backed by an external command, e.g. `jac check <file>`.
pub struct CommandSyntaxChecker {
    program: String,
    args: Vec<String>,
    suffix: String,
    timeout: Duration,
}

impl CommandSyntaxChecker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec!["check".to_string()],
            suffix: ".jac".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SyntaxChecker for CommandSyntaxChecker {
    async fn check(&self, code: &str) -> CheckOutcome {
        let mut file = match tempfile::Builder::new().suffix(&self.suffix).tempfile() {
            Ok(file) => file,
            Err(e) => return CheckOutcome::fail(vec![format!("syntax check setup failed: {e}")]),
        };
        if let Err(e) = file.write_all(code.as_bytes()) {
            return CheckOutcome::fail(vec![format!("syntax check setup failed: {e}")]);
        }

        let run = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .output();

        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => CheckOutcome::fail(vec!["syntax check timed out".to_string()]),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                // Checker not installed; skip validation.
                debug!(program = %self.program, "syntax checker unavailable, passing");
                CheckOutcome::pass()
            }
            Ok(Err(e)) => {
                warn!(program = %self.program, error = %e, "syntax check failed to run");
                CheckOutcome::fail(vec![format!("syntax check failed to run: {e}")])
            }
            Ok(Ok(output)) => {
                let combined = format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                let errors: Vec<String> = combined
                    .lines()
                    .map(str::trim)
                    .filter(|line| {
                        line.starts_with("Error:")
                            || (line.to_lowercase().contains("error") && line.contains(':'))
                    })
                    .map(String::from)
                    .collect();

                if output.status.success() {
                    CheckOutcome::pass()
                } else {
                    CheckOutcome { ok: false, errors }
                }
            }
        }
    }
}
