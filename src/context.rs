//! Query-time context assembly.
//!
//! After recall and reranking, candidates are walked in rank order and
//! selected while they fit the prompt token budget. Selection is a prefix of
//! the (filtered) ranked list: the first candidate that would overflow the
//! budget ends it, even if a later, shorter candidate would still fit.

use serde::Serialize;

use crate::{
    config::EngineConfig,
    error::Result,
    noise::clean_context,
    reranker::RankedCandidate,
    tokenizer::TokenCounter,
};

/// Returned instead of an empty context.
pub const NO_CONTEXT_SENTINEL: &str = "No relevant context found.";

/// Vocabulary that marks a context as examples, figures or pointers rather
/// than explanation.
const WEAK_MARKERS: &[&str] = &[
    "figura", "figure", "fig", "exemplo", "example", "veja", "see", "observe",
    "nota", "note", "referência", "reference", "tabela", "table",
];

/// Share of marker words at which a context counts as weak.
const WEAK_MARKER_RATIO: f64 = 0.05;

/// Limits applied while selecting and assembling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_prompt_tokens: usize,
    pub min_context_chars: usize,
    pub min_line_chars: usize,
}

impl From<&EngineConfig> for Budget {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_prompt_tokens: config.max_prompt_tokens,
            min_context_chars: config.min_context_chars,
            min_line_chars: config.min_line_chars,
        }
    }
}

/// A candidate accepted into the context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selected {
    /// Cleaned text that goes into the context.
    pub text: String,
    pub tokens: usize,
    /// Position in the ranked list.
    pub rank: usize,
}

/// Pick candidates in rank order until the token budget is exhausted.
///
/// A candidate is skipped when its raw text contains, or is contained in,
/// the raw text of an already selected candidate, or when its cleaned text
/// is shorter than `min_context_chars`. A candidate the tokenizer cannot
/// measure is logged and skipped.
pub fn select_under_budget(
    ranked: &[RankedCandidate],
    budget: &Budget,
    counter: &dyn TokenCounter,
) -> Result<Vec<Selected>> {
    let mut selected = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    let mut used = 0;

    for (rank, candidate) in ranked.iter().enumerate() {
        let raw = candidate.chunk.text.as_str();
        if seen.iter().any(|s| s.contains(raw) || raw.contains(s)) {
            continue;
        }

        let cleaned = clean_context(raw, budget.min_line_chars);
        if cleaned.chars().count() < budget.min_context_chars {
            continue;
        }

        let tokens = match counter.count(&cleaned) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(rank, error = %e, "skipping candidate");
                continue;
            }
        };
        if used + tokens > budget.max_prompt_tokens {
            tracing::debug!(rank, tokens, used, "token budget reached");
            break;
        }

        used += tokens;
        seen.push(raw);
        selected.push(Selected {
            text: cleaned,
            tokens,
            rank,
        });
    }

    Ok(selected)
}

/// Join selected texts with a blank line and cut the result to
/// `max_tokens`. Nothing selected yields [`NO_CONTEXT_SENTINEL`].
pub fn assemble(
    selected: &[Selected],
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Result<String> {
    if selected.is_empty() {
        return Ok(NO_CONTEXT_SENTINEL.to_string());
    }
    let joined = selected
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(counter.truncate(&joined, max_tokens)?.trim_end().to_string())
}

/// Whether a context is too short or dominated by example/figure/reference
/// vocabulary to ground an answer well. Advisory only.
///
/// # Examples
///
/// ```
/// use docrag::context::is_weak_context;
///
/// assert!(is_weak_context("Veja a figura.", 100));
/// ```
pub fn is_weak_context(context: &str, min_chars: usize) -> bool {
    if context.chars().count() < min_chars {
        return true;
    }
    let words: Vec<String> = context
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        return true;
    }
    let markers = words
        .iter()
        .filter(|w| WEAK_MARKERS.contains(&w.as_str()))
        .count();
    markers as f64 / words.len() as f64 >= WEAK_MARKER_RATIO
}

/// Cleaned, single-line preview of a context, at most `max_chars` long.
pub fn normalized_preview(
    context: &str,
    min_line_chars: usize,
    max_chars: usize,
) -> String {
    clean_context(context, min_line_chars)
        .replace('\n', " ")
        .chars()
        .take(max_chars)
        .collect()
}

/// Observability record of one retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DebugBundle {
    /// Query as sent to recall and reranking.
    pub query_translated: String,
    /// Assembled context in the corpus language.
    pub context: String,
    /// Context in the pivot language, or its untranslated fallback.
    pub context_translated: String,
    /// Cleaned, flattened preview of the context.
    pub normalized: String,
}

/// Everything a query produces.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    /// Assembled context, or [`NO_CONTEXT_SENTINEL`].
    pub context: String,
    /// Reranked candidates, best first.
    pub ranked: Vec<RankedCandidate>,
    /// Set when the context looks too thin to ground an answer.
    pub weak: bool,
    pub debug: DebugBundle,
}

impl Retrieval {
    /// The no-context result for `query`.
    pub fn empty(query: &str) -> Self {
        Self {
            context: NO_CONTEXT_SENTINEL.to_string(),
            ranked: Vec::new(),
            weak: true,
            debug: DebugBundle {
                query_translated: query.to_string(),
                context: NO_CONTEXT_SENTINEL.to_string(),
                context_translated: NO_CONTEXT_SENTINEL.to_string(),
                normalized: String::new(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.context == NO_CONTEXT_SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunking::Chunk,
        testing::{POISON_WORD, PoisonTokenizer, WordTokenizer},
    };

    fn candidate(text: &str, rank: usize) -> RankedCandidate {
        RankedCandidate {
            chunk: Chunk::new(text, "doc.txt", None, 0),
            score: 1.0 / (rank as f32 + 1.0),
            recall_rank: rank,
        }
    }

    /// A passage of `words` words in lines long enough to survive cleaning.
    fn passage(tag: &str, words: usize) -> String {
        (0..words)
            .map(|i| format!("{tag}{i}"))
            .collect::<Vec<_>>()
            .chunks(8)
            .map(|line| line.join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn budget(max_prompt_tokens: usize) -> Budget {
        Budget {
            max_prompt_tokens,
            min_context_chars: 100,
            min_line_chars: 30,
        }
    }

    #[test]
    fn selection_stops_at_first_overflow() {
        let ranked = vec![
            candidate(&passage("alpha", 40), 0),
            candidate(&passage("beta", 40), 1),
            candidate(&passage("gamma", 40), 2),
            // Would fit on its own, but comes after the overflow.
            candidate(&passage("delta", 16), 3),
        ];

        let selected =
            select_under_budget(&ranked, &budget(100), &WordTokenizer)
                .unwrap();
        let ranks: Vec<_> = selected.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![0, 1]);
        assert!(selected.iter().map(|s| s.tokens).sum::<usize>() <= 100);
    }

    #[test]
    fn assembled_context_never_exceeds_budget() {
        let ranked: Vec<_> = (0..6)
            .map(|i| candidate(&passage(&format!("w{i}x"), 24 + i * 7), i))
            .collect();

        for max in [0, 10, 30, 60, 100, 500] {
            let selected =
                select_under_budget(&ranked, &budget(max), &WordTokenizer)
                    .unwrap();
            let context = assemble(&selected, max, &WordTokenizer).unwrap();
            if selected.is_empty() {
                assert_eq!(context, NO_CONTEXT_SENTINEL);
            } else {
                assert!(WordTokenizer.count(&context).unwrap() <= max);
            }
            // Prefix of the ranked list.
            for (i, s) in selected.iter().enumerate() {
                assert_eq!(s.rank, i);
            }
        }
    }

    #[test]
    fn contained_candidates_are_skipped() {
        let long = passage("alpha", 40);
        let contained = long.lines().take(3).collect::<Vec<_>>().join("\n");
        let ranked = vec![
            candidate(&long, 0),
            candidate(&contained, 1),
            candidate(&passage("beta", 24), 2),
        ];

        let selected =
            select_under_budget(&ranked, &budget(500), &WordTokenizer)
                .unwrap();
        let ranks: Vec<_> = selected.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![0, 2]);
    }

    #[test]
    fn noisy_candidates_are_skipped() {
        let ranked = vec![
            candidate("Figura 3", 0),
            candidate("12.3, 45.6 - 78.9\n[12] Booch 1999", 1),
            candidate(&passage("gamma", 24), 2),
        ];

        let selected =
            select_under_budget(&ranked, &budget(500), &WordTokenizer)
                .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].rank, 2);
    }

    #[test]
    fn unmeasurable_candidates_are_skipped() {
        let poisoned = format!("{} {POISON_WORD}", passage("alpha", 24));
        let ranked = vec![
            candidate(&poisoned, 0),
            candidate(&passage("beta", 24), 1),
        ];

        let selected =
            select_under_budget(&ranked, &budget(500), &PoisonTokenizer)
                .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].rank, 1);
    }

    #[test]
    fn assemble_joins_with_blank_lines() {
        let selected = vec![
            Selected {
                text: "first".into(),
                tokens: 1,
                rank: 0,
            },
            Selected {
                text: "second".into(),
                tokens: 1,
                rank: 1,
            },
        ];
        assert_eq!(
            assemble(&selected, 10, &WordTokenizer).unwrap(),
            "first\n\nsecond"
        );
        assert_eq!(
            assemble(&[], 10, &WordTokenizer).unwrap(),
            NO_CONTEXT_SENTINEL
        );
    }

    #[test]
    fn weak_context_heuristic() {
        let explanation = "A class groups objects that share attributes, \
                           operations and relationships; associations connect \
                           classes and state how many objects take part.";
        assert!(!is_weak_context(explanation, 100));

        let pointers = "See figure 2 and example 3, note the table in the \
                        reference list, then observe the figure once more.";
        assert!(is_weak_context(pointers, 50));
        assert!(is_weak_context(NO_CONTEXT_SENTINEL, 100));
    }

    #[test]
    fn preview_is_cleaned_and_cut() {
        let context = "CAPITULO 1 - INTRODUCAO GERAL\n\
                       Uma classe descreve objetos com atributos comuns.";
        let preview = normalized_preview(context, 30, 20);
        assert_eq!(preview, "Uma classe descreve ");
    }

    #[test]
    fn empty_retrieval_uses_sentinel() {
        let retrieval = Retrieval::empty("query");
        assert!(retrieval.is_empty());
        assert!(retrieval.ranked.is_empty());
        assert_eq!(retrieval.debug.query_translated, "query");
    }
}
