//! Test support: in-memory mocks for every harness seam, data builders,
//! and a small fixture suite.

pub mod builders;
pub mod fixtures;
pub mod mocks;

pub use builders::{RunRequestBuilder, TestCaseBuilder};
pub use fixtures::{sample_answers, sample_suite};
pub use mocks::{FixedClock, MemoryStore, MockModelClient, MockSyntaxChecker, StaticVariantCatalog};
