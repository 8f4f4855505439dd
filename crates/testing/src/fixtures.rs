//! Shared fixture data.

use docbench_domain::TestSuite;

use crate::builders::TestCaseBuilder;

/// Three-case suite: 10 + 20 + 30 points across three categories and
/// levels.
pub fn sample_suite() -> TestSuite {
    let cases = vec![
        TestCaseBuilder::new("t1")
            .category("Basic Syntax")
            .level(1)
            .points(10)
            .required(&["A"])
            .build(),
        TestCaseBuilder::new("t2")
            .category("Objects")
            .level(2)
            .points(20)
            .required(&["B", "C"])
            .build(),
        TestCaseBuilder::new("t3")
            .category("Walkers")
            .level(3)
            .points(30)
            .required(&["D"])
            .build(),
    ];
    TestSuite::new("sample", cases).expect("sample suite is valid")
}

/// Answers that score 100% against [`sample_suite`].
pub fn sample_answers() -> Vec<(String, String)> {
    vec![
        ("t1".to_string(), "A".to_string()),
        ("t2".to_string(), "B C".to_string()),
        ("t3".to_string(), "D".to_string()),
    ]
}
