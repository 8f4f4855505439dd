//! Soft textual syntax rules.
//!
//! Lightweight heuristics over the raw response text: delimiter balance,
//! stray commas before closers, and a keyword-driven semicolon check.
//! Each returned message counts as one violation for the scorer.

/// Keywords that start a statement line expected to end with a semicolon.
const STATEMENT_KEYWORDS: &[&str] = &[
    "glob ",
    "has ",
    "print(",
    "report ",
    "import ",
    "include ",
    "disengage",
    "raise ",
    "return ",
    "break",
    "continue",
];

/// Line prefixes that open blocks or clauses and never take a semicolon.
const BLOCK_STARTERS: &[&str] = &[
    "def ", "obj ", "node ", "edge ", "walker ", "enum ", "can ", "if ", "elif ", "else", "for ",
    "while ", "try", "except", "match ", "case ", "with ", "class ", "async def",
];

/// Run all soft rules over a response and collect violation messages.
pub fn soft_syntax_violations(code: &str) -> Vec<String> {
    let mut violations = Vec::new();

    check_balance(code, '{', '}', "braces", &mut violations);
    check_balance(code, '[', ']', "brackets", &mut violations);
    check_balance(code, '(', ')', "parentheses", &mut violations);
    check_stray_commas(code, &mut violations);
    check_semicolons(code, &mut violations);

    violations
}

fn check_balance(code: &str, open: char, close: char, name: &str, out: &mut Vec<String>) {
    let opens = code.chars().filter(|c| *c == open).count();
    let closes = code.chars().filter(|c| *c == close).count();
    if opens != closes {
        out.push(format!("mismatched {name}: {opens} opening, {closes} closing"));
    }
}

/// A comma directly followed (ignoring whitespace) by `}` or `]`.
fn check_stray_commas(code: &str, out: &mut Vec<String>) {
    let mut last_significant = ' ';
    for c in code.chars() {
        if c.is_whitespace() {
            continue;
        }
        if (c == '}' || c == ']') && last_significant == ',' {
            out.push(format!("stray comma before '{c}'"));
        }
        last_significant = c;
    }
}

fn check_semicolons(code: &str, out: &mut Vec<String>) {
    for (i, line) in code.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') || stripped.starts_with("*#") {
            continue;
        }
        if BLOCK_STARTERS.iter().any(|s| stripped.starts_with(s)) {
            continue;
        }

        let is_statement = STATEMENT_KEYWORDS.iter().any(|k| stripped.contains(k))
            || stripped.contains('=');
        if !is_statement {
            continue;
        }

        let ends_ok = stripped.ends_with(';')
            || stripped.ends_with('{')
            || stripped.ends_with('}')
            || stripped.ends_with(':')
            || stripped.ends_with(',')
            || stripped.ends_with('\\');
        if !ends_ok {
            let preview: String = stripped.chars().take(60).collect();
            out.push(format!("line {} may be missing a semicolon: {preview}", i + 1));
        }
    }
}
