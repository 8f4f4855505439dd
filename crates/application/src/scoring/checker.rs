//! External syntax-check seam.

use async_trait::async_trait;

/// Result of an external compile/syntax check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }

    pub fn fail(errors: Vec<String>) -> Self {
        Self { ok: false, errors }
    }
}

/// Compile-level validation of a generated response.
///
/// Implementations must be quick (under five seconds) and treat their own
/// timeouts as failures.
#[async_trait]
pub trait SyntaxChecker: Send + Sync {
    async fn check(&self, code: &str) -> CheckOutcome;
}

/// Checker that accepts everything. Used when no external checker is
/// configured, mirroring the original's skip-when-unavailable behaviour.
pub struct PassChecker;

#[async_trait]
impl SyntaxChecker for PassChecker {
    async fn check(&self, _code: &str) -> CheckOutcome {
        CheckOutcome::pass()
    }
}
