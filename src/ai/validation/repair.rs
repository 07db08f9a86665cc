//! Structural Repair Engine
//!
//! One fixed, ordered pass of textual repairs over a candidate document that
//! failed to parse:
//!
//! 1. Collapse duplicated separators (`,,` → `,`)
//! 2. Remove a separator right before `}` or `]`
//! 3. Quote bare field names followed by `:`
//! 4. Fill a dangling `"key":` with `null`
//! 5. Drop everything after the last `}`
//! 6. Append the missing closers for unmatched `{` / `[`
//!
//! The pass runs once; it is never iterated to a fixed point. Rules 3 and 4
//! are regex matches over raw text, not a tokenizer, and can misfire on
//! string values that look like the defect (e.g. `"a, b: c"`). Input that
//! already parses never reaches the pass.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{PipelineError, Result};

/// `{` or `,`, an identifier, then `:`
static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").expect("bare key pattern is valid")
});

/// `"key":` followed by something that cannot start a value
static DANGLING_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"("(?:[^"\\]|\\.)*"\s*:)(\s*)([^\s"{\[0-9tfn\-])"#)
        .expect("dangling key pattern is valid")
});

/// `"key":` at the very end of the text
static DANGLING_KEY_AT_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"("(?:[^"\\]|\\.)*"\s*:)\s*\z"#).expect("trailing key pattern is valid")
});

/// A single named repair rule
pub type RepairRule = fn(&str) -> String;

/// The repair pass, in application order
pub const REPAIR_PASS: [(&str, RepairRule); 6] = [
    ("collapse_duplicate_separators", collapse_duplicate_separators),
    ("remove_trailing_separators", remove_trailing_separators),
    ("quote_bare_keys", quote_bare_keys),
    ("fill_dangling_keys", fill_dangling_keys),
    ("truncate_after_last_brace", truncate_after_last_brace),
    ("close_unbalanced", close_unbalanced),
];

/// Parsed document and whether the repair pass was needed
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub value: Value,
    pub repaired: bool,
}

/// Parse a candidate, applying the repair pass once if the first parse fails
pub fn repair_and_parse(candidate: &str) -> Result<RepairOutcome> {
    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Ok(RepairOutcome {
            value,
            repaired: false,
        });
    }

    debug!("Initial parse failed, applying repair pass");
    let repaired = run_repair_pass(candidate);

    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            warn!("Model output parsed after structural repair");
            Ok(RepairOutcome {
                value,
                repaired: true,
            })
        }
        Err(e) => {
            debug!(error = %e, "Repair pass did not produce parseable output");
            Err(PipelineError::repair_exhausted(candidate))
        }
    }
}

/// Apply every rule of the pass exactly once
pub fn run_repair_pass(candidate: &str) -> String {
    let mut text = candidate.to_string();
    for (name, rule) in REPAIR_PASS {
        let next = rule(&text);
        if next != text {
            debug!(rule = name, "Repair rule changed the candidate");
        }
        text = next;
    }
    text
}

// =============================================================================
// String tracking
// =============================================================================

/// Tracks whether a character stream is inside a JSON string literal
#[derive(Debug, Default)]
struct StringTracker {
    in_string: bool,
    escaped: bool,
}

impl StringTracker {
    /// Feed one char; true when `ch` is structural (outside strings, not a quote)
    fn structural(&mut self, ch: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            false
        } else if ch == '"' {
            self.in_string = true;
            false
        } else {
            true
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Rule 1: collapse consecutive separators outside strings into one
pub fn collapse_duplicate_separators(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut tracker = StringTracker::default();
    let mut last_significant: Option<char> = None;

    for ch in s.chars() {
        let structural = tracker.structural(ch);
        if structural && ch == ',' && last_significant == Some(',') {
            continue;
        }
        if !ch.is_whitespace() {
            last_significant = Some(ch);
        }
        result.push(ch);
    }

    result
}

/// Rule 2: drop a separator followed (after whitespace) by `}` or `]`
pub fn remove_trailing_separators(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut tracker = StringTracker::default();

    for (i, &ch) in chars.iter().enumerate() {
        if tracker.structural(ch) && ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        result.push(ch);
    }

    result
}

/// Rule 3: wrap bare identifiers used as field names in quotes
pub fn quote_bare_keys(s: &str) -> String {
    BARE_KEY.replace_all(s, r#"${1}"${2}"${3}"#).into_owned()
}

/// Rule 4: insert `null` after a `"key":` that has no recognizable value
pub fn fill_dangling_keys(s: &str) -> String {
    let filled = DANGLING_KEY.replace_all(s, "${1}${2}null${3}");
    DANGLING_KEY_AT_END
        .replace(&filled, "${1}null")
        .into_owned()
}

/// Rule 5: discard trailing content after the last `}`
pub fn truncate_after_last_brace(s: &str) -> String {
    match s.rfind('}') {
        Some(end) => s[..=end].to_string(),
        None => s.to_string(),
    }
}

/// Rule 6: append the closers missing for unmatched `{` and `[`.
///
/// Closers follow nesting order, innermost first, instead of every `}`
/// followed by every `]`: `{"a":[1,2` becomes `{"a":[1,2]}`, never
/// `{"a":[1,2}]`. An unterminated string is closed and a dangling separator
/// dropped before the closers are added.
pub fn close_unbalanced(s: &str) -> String {
    let mut tracker = StringTracker::default();
    let mut open: Vec<char> = Vec::new();

    for ch in s.chars() {
        if !tracker.structural(ch) {
            continue;
        }
        match ch {
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                if open.last() == Some(&ch) {
                    open.pop();
                }
            }
            _ => {}
        }
    }

    if open.is_empty() && !tracker.in_string {
        return s.to_string();
    }

    let mut result = s.to_string();
    if tracker.in_string {
        if tracker.escaped {
            result.push('\\');
        }
        result.push('"');
    } else {
        let trimmed_len = result.trim_end().trim_end_matches(',').len();
        result.truncate(trimmed_len);
    }

    while let Some(closer) = open.pop() {
        result.push(closer);
    }

    result
}
