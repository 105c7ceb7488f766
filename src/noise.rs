//! Heuristic noise filtering for chunks and retrieved context.
//!
//! The filter runs at two boundaries with different strictness:
//!
//! - **Index time**: [`is_informative`] decides whether a candidate chunk is
//!   worth embedding at all, after [`scrub_chunk`] has stripped the obvious
//!   artifacts (heading lines, captions, bracketed references).
//! - **Query time**: [`clean_context`] walks the lines of a retrieved chunk,
//!   drops the offending ones and returns a single whitespace-collapsed
//!   string.
//!
//! Each heuristic is one entry of a rule table, `(reason, pattern)`, so every
//! rule can be exercised on its own through [`classify`] and
//! [`classify_line`].

use std::sync::LazyLock;

use regex::Regex;

/// Why a fragment was considered noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseReason {
    /// Shorter than the minimum informative length.
    TooShort,
    /// Upper-case title or boilerplate block.
    UppercaseTitle,
    /// Figure, table, source or example caption.
    Caption,
    /// Bare numeric reference such as `[12]` or `(3).`
    BareReference,
    /// Nothing but bullet list items.
    ListItem,
    /// Only digits and punctuation.
    NumericOnly,
    /// Dotted enumeration such as `7.3.1`.
    Enumeration,
    /// Bracketed reference at the start or a year at the end of a line.
    Citation,
    /// Front/back matter vocabulary (chapter, index, page ...).
    Boilerplate,
}

/// A single named heuristic.
pub struct NoiseRule {
    pub reason: NoiseReason,
    pub pattern: Regex,
}

impl NoiseRule {
    fn new(reason: NoiseReason, pattern: &str) -> Self {
        Self {
            reason,
            pattern: Regex::new(pattern).expect("noise rule pattern is valid"),
        }
    }
}

/// Rules applied to whole candidate chunks before indexing.
pub static INDEX_RULES: LazyLock<Vec<NoiseRule>> = LazyLock::new(|| {
    use NoiseReason::*;
    vec![
        NoiseRule::new(UppercaseTitle, r"^[A-Z\s]{8,}$"),
        NoiseRule::new(
            Caption,
            r"(?i)^\s*(?:figura|figure|fig\.|fonte|source|tabela|table|quadro|exemplo|example)\b",
        ),
        NoiseRule::new(BareReference, r"^(?:\[?\(?\{?\d+\}?\)?\]?\.? *)+$"),
        NoiseRule::new(
            ListItem,
            r"^(?:[ \t]*[*+•-][ \t]+[^\n]*\S[^\n]*(?:\n+|$))+$",
        ),
        NoiseRule::new(NumericOnly, r"^[\d\s.,;:-]+$"),
    ]
});

/// Rules applied to individual lines of retrieved context.
pub static LINE_RULES: LazyLock<Vec<NoiseRule>> = LazyLock::new(|| {
    use NoiseReason::*;
    vec![
        NoiseRule::new(UppercaseTitle, r"^[A-Z0-9 \-–.:]{10,}$"),
        NoiseRule::new(Enumeration, r"^(?:[0-9]+\.){2,}"),
        NoiseRule::new(Caption, r"(?i)\bfig(?:ura|ure)?[. ]"),
        NoiseRule::new(Citation, r"^\[\d+\]|\d{4}$"),
        NoiseRule::new(Caption, r"(?i)^(?:tabela|table)\s*\d+"),
        NoiseRule::new(NumericOnly, r"^\s*\d+\s*$"),
        NoiseRule::new(NumericOnly, r"^[\d\s\p{P}]+$"),
        NoiseRule::new(
            Boilerplate,
            r"(?i)\b(?:fonte|exerc[íi]cio|anexo|cap[íi]tulo|introdução|sumário|índice|página)\b",
        ),
    ]
});

static HEADING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*[A-Z][A-Z \t]{7,}[ \t]*$").unwrap()
});
static CAPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:figura|figure|fonte|source|tabela|table|quadro)\b[^\n]*$",
    )
    .unwrap()
});
static BRACKET_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d{1,3}\]").unwrap());
static HORIZONTAL_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").unwrap());
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// The first index-time rule `text` trips, if any.
pub fn classify(text: &str, min_chars: usize) -> Option<NoiseReason> {
    let trimmed = text.trim();
    if trimmed.chars().count() < min_chars {
        return Some(NoiseReason::TooShort);
    }
    INDEX_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(trimmed))
        .map(|rule| rule.reason)
}

/// Whether a candidate chunk carries enough information to be indexed.
///
/// # Examples
///
/// ```
/// use docrag::noise::is_informative;
///
/// assert!(!is_informative("Figura 3", 40));
/// assert!(is_informative(
///     "A use case describes how an actor interacts with the system.",
///     40,
/// ));
/// ```
pub fn is_informative(text: &str, min_chars: usize) -> bool {
    classify(text, min_chars).is_none()
}

/// The first query-time rule a single (trimmed) line trips, if any.
pub fn classify_line(line: &str, min_chars: usize) -> Option<NoiseReason> {
    let line = line.trim();
    if line.chars().count() < min_chars {
        return Some(NoiseReason::TooShort);
    }
    LINE_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(line))
        .map(|rule| rule.reason)
}

/// Drop noisy lines from retrieved text and collapse what is left into a
/// single whitespace-normalized string.
pub fn clean_context(text: &str, min_line_chars: usize) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| classify_line(line, min_line_chars).is_none())
        .collect();
    collapse_whitespace(&kept.join(" "))
}

/// Replace every run of two or more whitespace characters with one space.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Strip indexing artifacts from a candidate chunk: all-caps heading lines,
/// caption lines and bracketed numeric references. Horizontal whitespace
/// and blank-line runs are collapsed; single line breaks are kept so the
/// query-time filter can still reason about lines.
pub fn scrub_chunk(text: &str) -> String {
    let text = HEADING_LINE.replace_all(text, "");
    let text = CAPTION_LINE.replace_all(&text, "");
    let text = BRACKET_REF.replace_all(&text, "");
    let text = HORIZONTAL_RUN.replace_all(&text, " ");
    let text = BLANK_RUN.replace_all(&text, "\n");
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROSE: &str = "A class diagram shows the static structure of a \
                         system through its classes and relationships.";

    #[test]
    fn prose_is_informative() {
        assert_eq!(classify(PROSE, 40), None);
    }

    #[test]
    fn index_rules_each_fire() {
        let cases = [
            ("short text", NoiseReason::TooShort),
            (
                "CLASS DIAGRAMS AND OBJECT DIAGRAMS IN UML",
                NoiseReason::UppercaseTitle,
            ),
            (
                "Figura 3: diagrama de classes de uma biblioteca municipal",
                NoiseReason::Caption,
            ),
            (
                "Exemplo 2 - sistema de vendas com atores e casos de uso",
                NoiseReason::Caption,
            ),
            (
                "[1] [2] [3] [4] [5] [6] [7] [8] [9] [10] [11] [12] [13]",
                NoiseReason::BareReference,
            ),
            (
                "- first bullet item here\n- second bullet item here\n- third",
                NoiseReason::ListItem,
            ),
            (
                "1.2.3, 4.5.6; 7.8.9 - 10.11.12, 13.14.15; 16.17.18 - 19",
                NoiseReason::NumericOnly,
            ),
        ];
        for (text, expected) in cases {
            assert_eq!(classify(text, 40), Some(expected), "{text:?}");
        }
    }

    #[test]
    fn caption_rule_is_anchored() {
        let text = "This passage refers to the figure below while describing \
                    how actors trigger use cases.";
        assert!(is_informative(text, 40));
    }

    #[test]
    fn list_rule_needs_every_line_to_be_a_bullet() {
        let text = "Actors interact with the system in several ways:\n\
                    - by starting a use case\n- by receiving results";
        assert!(is_informative(text, 40));
    }

    #[test]
    fn line_rules_each_fire() {
        let cases = [
            ("tiny", NoiseReason::TooShort),
            ("CAPITULO 3 - DIAGRAMAS DE CLASSES", NoiseReason::UppercaseTitle),
            (
                "7.3.1 Relações entre classes e objetos do domínio",
                NoiseReason::Enumeration,
            ),
            (
                "Como se pode ver na figura 4 a classe agrega objetos",
                NoiseReason::Caption,
            ),
            (
                "[12] Booch, G. The Unified Modeling Language guide",
                NoiseReason::Citation,
            ),
            (
                "Texto publicado originalmente pela editora em 2019",
                NoiseReason::Citation,
            ),
            (
                "Tabela 2 resume as multiplicidades mais frequentes",
                NoiseReason::Caption,
            ),
            (
                "12.34, 56.78; 90.12 - 34.56 / 78.90 (12)",
                NoiseReason::NumericOnly,
            ),
            (
                "Consulte o anexo para a lista completa dos exemplos",
                NoiseReason::Boilerplate,
            ),
        ];
        for (line, expected) in cases {
            assert_eq!(classify_line(line, 30), Some(expected), "{line:?}");
        }
    }

    #[test]
    fn every_line_rule_matches_its_sample() {
        let samples = [
            "ANEXO A - TABELAS",
            "1.2.3 Multiplicidade",
            "ver fig. 2",
            "[3] UML Distilled",
            "Tabela 4",
            "  42  ",
            "(12) - 34.5",
            "Sumário geral",
        ];
        assert_eq!(samples.len(), LINE_RULES.len());
        for (rule, sample) in LINE_RULES.iter().zip(samples) {
            assert!(
                rule.pattern.is_match(sample),
                "{:?} should match {sample:?}",
                rule.reason
            );
        }
    }

    #[test]
    fn digit_only_lines_are_dropped() {
        let digits = "123456789012345678901234567890123";
        assert!(classify_line(digits, 30).is_some());
        assert!(classify_line("  2024  ", 0).is_some());
    }

    #[test]
    fn clean_context_keeps_prose_and_collapses() {
        let raw = "DIAGRAMAS DE CLASSES E OBJETOS\n\
                   Uma classe descreve   um conjunto de objetos com atributos.\n\
                   42\n\
                   Figura 3 mostra a classe Livro e os seus atributos\n\
                   As associações ligam classes e indicam multiplicidades.";
        let cleaned = clean_context(raw, 30);
        assert_eq!(
            cleaned,
            "Uma classe descreve um conjunto de objetos com atributos. \
             As associações ligam classes e indicam multiplicidades."
        );
    }

    #[test]
    fn clean_context_never_keeps_numeric_or_short_lines() {
        let raw = "1234 5678\n...!!!\nok\n\
                   An actor is an external entity that interacts with the system.";
        let cleaned = clean_context(raw, 30);
        assert!(!cleaned.contains("1234"));
        assert!(!cleaned.contains("!!!"));
        assert!(!cleaned.contains("ok "));
        assert!(cleaned.starts_with("An actor"));
    }

    #[test]
    fn scrub_removes_artifacts() {
        let raw = "INTRODUCTION TO UML\n\
                   UML is a modeling   language [12] for software.\n\
                   \n\n\
                   Figure 2: the four views\n\
                   It unifies several earlier notations.";
        assert_eq!(
            scrub_chunk(raw),
            "UML is a modeling language for software.\n\
             It unifies several earlier notations."
        );
    }

    #[test]
    fn scrub_keeps_unbracketed_numbers() {
        assert_eq!(
            scrub_chunk("UML 2.5 defines 14 diagram types."),
            "UML 2.5 defines 14 diagram types."
        );
    }
}
