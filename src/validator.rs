//! Solution checking: strict equality after normalization.
//!
//! Both sides are re-tokenized and joined with single spaces, so spacing
//! around punctuation never matters (`print("hi")` == `print ( "hi" )`), while
//! token content and order do. No AST comparison: renamed variables or
//! reordered-but-equivalent expressions are rejected.

use serde::{Deserialize, Serialize};

use crate::puzzle::tokenize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    /// Nothing has been checked yet.
    Pending,
}

impl Verdict {
    pub fn is_correct(self) -> bool {
        self == Verdict::Correct
    }
}

/// Canonical comparison form of a snippet.
pub fn normalize(text: &str) -> String {
    let spaced = tokenize(text).join(" ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn validate(candidate: &str, canonical: &str) -> Verdict {
    let want = normalize(canonical);
    if !want.is_empty() && normalize(candidate) == want {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    }
}
