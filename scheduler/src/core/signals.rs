//! Scanning of assistant output for quota signals and session ids.
//!
//! Like the usage parser, this is heuristic text matching over
//! unstructured output, kept pure so it can be tested against a fixed
//! corpus of samples.

use std::sync::LazyLock;

use regex::Regex;

/// Phrases that indicate the assistant ran out of quota. Matched
/// case-insensitively against combined stdout + stderr.
const QUOTA_PHRASES: [&str; 7] = [
    "rate limit",
    "usage limit",
    "token limit",
    "quota exceeded",
    "limit reached",
    "too many requests",
    "capacity limit",
];

/// True if the combined output contains a quota-exhaustion phrase.
pub fn quota_exhausted_in(stdout: &str, stderr: &str) -> bool {
    let combined = format!("{stdout}{stderr}").to_lowercase();
    QUOTA_PHRASES
        .iter()
        .any(|phrase| combined.contains(phrase))
}

static SESSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)session[_\-\s]+id[:\s]+([a-f0-9\-]{36})",
        r"(?i)Session:\s+([a-f0-9\-]{36})",
        r"(?i)ID:\s+([a-f0-9\-]{36})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Extract a session id from assistant output. First matching label
/// pattern wins; `None` when no pattern matches.
pub fn extract_session_id(output: &str) -> Option<String> {
    for pattern in SESSION_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(output) {
            return Some(caps[1].to_string());
        }
    }
    None
}
