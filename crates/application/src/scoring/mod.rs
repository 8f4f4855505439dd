//! Deterministic evaluation of run artifacts.

mod checker;
mod engine;
mod syntax;

pub use checker::{CheckOutcome, PassChecker, SyntaxChecker};
pub use engine::{Scorer, ScorerConfig};
pub use syntax::soft_syntax_violations;
