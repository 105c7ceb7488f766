//! Answer grounding check for callers that generate text from a context.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::Serialize;

static KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w{4,}\b").unwrap());

/// Words of four or more characters shared by an answer and its context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordOverlap {
    /// Number of distinct shared keywords.
    pub shared: usize,
    /// Whether `shared` reached the required minimum.
    pub grounded: bool,
}

fn keywords(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    KEYWORD
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Count the distinct keywords `answer` shares with `context`,
/// case-insensitively, and compare against `min_match`.
///
/// # Examples
///
/// ```
/// use docrag::validation::keyword_overlap;
///
/// let context = "An actor interacts with the system through a use case.";
/// let answer = "The ACTOR starts the use case and the system responds.";
/// let overlap = keyword_overlap(answer, context, 3);
/// // actor, case, system
/// assert_eq!(overlap.shared, 3);
/// assert!(overlap.grounded);
/// ```
pub fn keyword_overlap(
    answer: &str,
    context: &str,
    min_match: usize,
) -> KeywordOverlap {
    let shared = keywords(answer).intersection(&keywords(context)).count();
    KeywordOverlap {
        shared,
        grounded: shared >= min_match,
    }
}
