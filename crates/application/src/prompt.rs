//! Batch prompt construction and response parsing.
//!
//! Each batch is sent as one prompt: the documentation blob followed by
//! the batch's test cases serialized as JSON. The model is asked to
//! return a JSON object mapping test ids to code strings; parsing is
//! lenient about markdown fences but strict about the JSON itself.

use serde::Serialize;
use std::collections::BTreeMap;

use docbench_domain::{Error, Result, TestCase};

#[derive(Serialize)]
struct PromptCase<'a> {
    id: &'a str,
    level: u32,
    category: &'a str,
    task: &'a str,
    points: u32,
    hints: &'a [String],
}

#[derive(Serialize)]
struct PromptTests<'a> {
    tests: Vec<PromptCase<'a>>,
}

/// Build the full prompt for one batch of test cases.
pub fn build_prompt(doc: &str, cases: &[TestCase]) -> String {
    let tests = PromptTests {
        tests: cases
            .iter()
            .map(|c| PromptCase {
                id: &c.id,
                level: c.level,
                category: &c.category,
                task: &c.task,
                points: c.points,
                hints: &c.hints,
            })
            .collect(),
    };
    // PromptTests serialization cannot fail: it is strings and integers.
    let tests_json = serde_json::to_string_pretty(&tests).expect("prompt serialization");

    format!(
        "You are a Jac programming language expert. Write valid Jac code for each \
         test case based on the documentation.\n\n\
         # Documentation\n{doc}\n\n\
         # Test Cases\n{tests_json}\n\n\
         # Task\n\
         Return a JSON object mapping each test ID to Jac code. Use \\n for newlines \
         and \\\" for quotes in the code strings.\n"
    )
}

/// Parse a model response into a response map for the given batch.
///
/// Entries whose keys are not in the batch are dropped; absent batch ids
/// are left to the artifact assembly to mark as missing.
pub fn parse_responses(text: &str, cases: &[TestCase]) -> Result<BTreeMap<String, String>> {
    let body = strip_fences(text.trim());

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::InvalidResponse(format!("batch response is not valid JSON: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| Error::InvalidResponse("batch response is not a JSON object".into()))?;

    let mut responses = BTreeMap::new();
    for case in cases {
        if let Some(entry) = object.get(&case.id) {
            let code = entry
                .as_str()
                .ok_or_else(|| {
                    Error::InvalidResponse(format!("response for '{}' is not a string", case.id))
                })?
                .to_string();
            responses.insert(case.id.clone(), code);
        }
    }
    Ok(responses)
}

/// Strip a single surrounding markdown code fence, if present.
fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
