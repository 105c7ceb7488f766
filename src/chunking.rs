//! Splitting documents into embeddable chunks.
//!
//! Splitting happens in three stages:
//!
//! 1. [`split_spans`] partitions a document at semantic boundaries (labelled
//!    section keywords, all-caps headings, numbered subsections, markdown
//!    headers and blank-line runs).
//! 2. [`window_text`] cuts spans longer than the configured chunk size into
//!    overlapping character windows that end on word boundaries.
//! 3. [`limit_tokens`] subdivides any window the embedding tokenizer still
//!    measures above the model limit.

use std::{ops::Range, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    dedup::content_hash,
    error::{Error, Result},
    tokenizer::TokenCounter,
};

/// A unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Trimmed chunk text.
    pub text: String,
    /// SHA-256 hex of `text`.
    pub hash: String,
    /// Corpus-relative path of the originating document.
    pub source: String,
    /// Heading of the span the chunk was cut from, when it had one.
    pub section: Option<String>,
    /// Length in embedding tokenizer tokens.
    pub token_len: usize,
}

impl Chunk {
    pub fn new(
        text: &str,
        source: &str,
        section: Option<&str>,
        token_len: usize,
    ) -> Self {
        let text = text.trim();
        Self {
            text: text.to_string(),
            hash: content_hash(text),
            source: source.to_string(),
            section: section.map(str::to_string),
            token_len,
        }
    }
}

// -- Semantic spans --

static SECTION_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:Associação|Agregação|Composição|Ator|Actor|Diagrama|Definição|Resumo|Sintaxe|Exemplo|Definition|Summary|Syntax|Example|Diagram)(?:\s|:|–|-)",
    )
    .unwrap()
});
static CAPS_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\p{Lu}[\p{Lu}\d \t.:–-]{5,}$").unwrap()
});
static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\d+").unwrap());
static MARKDOWN_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+ ").unwrap());

fn opens_section(line: &str) -> bool {
    let content = line.trim_end_matches(['\n', '\r']);
    SECTION_KEYWORD.is_match(content)
        || NUMBERED.is_match(content)
        || MARKDOWN_HEADER.is_match(content)
        || (line.ends_with('\n') && CAPS_HEADING.is_match(content.trim()))
}

/// Byte ranges partitioning `text` at semantic boundaries.
///
/// A new span starts at every line that opens a section and at the first
/// line of every blank-line run. The boundary line stays attached to the
/// span it introduces. The ranges are contiguous and cover the whole input.
///
/// # Examples
///
/// ```
/// use docrag::chunking::split_spans;
///
/// let text = "intro\n\n# Actors\nAn actor is external.\n";
/// let spans = split_spans(text);
/// assert_eq!(spans.first().map(|r| r.start), Some(0));
/// assert_eq!(spans.last().map(|r| r.end), Some(text.len()));
/// assert_eq!(&text[spans[2].clone()], "# Actors\nAn actor is external.\n");
/// ```
pub fn split_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    let mut prev_blank = false;

    for line in text.split_inclusive('\n') {
        let blank = line.trim().is_empty();
        let boundary = if blank { !prev_blank } else { opens_section(line) };
        if boundary && offset > start {
            spans.push(start..offset);
            start = offset;
        }
        prev_blank = blank;
        offset += line.len();
    }
    if offset > start {
        spans.push(start..offset);
    }

    spans
}

/// Trimmed, non-empty semantic spans of `text`.
pub fn split_semantic(text: &str) -> Vec<&str> {
    split_spans(text)
        .into_iter()
        .map(|range| text[range].trim())
        .filter(|span| !span.is_empty())
        .collect()
}

/// The heading that opens `span`, if its first line is a section marker.
pub fn heading_of(span: &str) -> Option<&str> {
    let first = span.trim_start().lines().next()?;
    let marked = SECTION_KEYWORD.is_match(first)
        || NUMBERED.is_match(first)
        || MARKDOWN_HEADER.is_match(first)
        || (span.trim_start().len() > first.len()
            && CAPS_HEADING.is_match(first.trim()));
    if !marked {
        return None;
    }
    let heading = first.trim_start_matches('#').trim();
    (!heading.is_empty()).then_some(heading)
}

// -- Character windows --

/// Split `text` into windows of at most `chunk_size` characters, with
/// `overlap` characters shared between neighbours.
///
/// Windows end on a word boundary when one is available in the last 100
/// characters. The final window always reaches the end of the text.
///
/// # Examples
///
/// ```
/// use docrag::chunking::window_text;
///
/// assert_eq!(window_text("Hello, world!", 1000, 0), vec!["Hello, world!"]);
///
/// let text = "word ".repeat(500);
/// let windows = window_text(&text, 1000, 200);
/// assert!(windows.len() >= 3);
/// assert!(text.trim_end().ends_with(windows.last().unwrap().trim_end()));
/// ```
pub fn window_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let char_count = text.chars().count();
    if char_count <= chunk_size || chunk_size == 0 {
        return vec![text];
    }

    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut windows = Vec::new();
    let mut start_char = 0;

    loop {
        let end_char = (start_char + chunk_size).min(char_count);
        let cut = if end_char < char_count {
            word_boundary_before(text, &char_to_byte, start_char, end_char)
        } else {
            end_char
        };

        let window = &text[char_to_byte[start_char]..char_to_byte[cut]];
        if !window.trim().is_empty() {
            windows.push(window);
        }
        if cut >= char_count {
            break;
        }

        let next = cut.saturating_sub(overlap);
        start_char = if next > start_char {
            word_start_after(text, &char_to_byte, next, cut)
        } else {
            cut
        };
    }

    windows
}

/// Char index just past the last whitespace in `(start, pos]`, looking back
/// at most 100 characters. Falls back to `pos`.
fn word_boundary_before(
    text: &str,
    char_to_byte: &[usize],
    start: usize,
    pos: usize,
) -> usize {
    let search_start = pos.saturating_sub(100).max(start + 1);
    if search_start >= pos {
        return pos;
    }

    let start_byte = char_to_byte[search_start];
    let region = &text[start_byte..char_to_byte[pos]];
    match region.rfind(char::is_whitespace) {
        Some(ws) => char_to_byte.partition_point(|&b| b <= start_byte + ws),
        None => pos,
    }
}

/// Move a window start forward to the beginning of a word, without
/// reaching `limit`.
fn word_start_after(
    text: &str,
    char_to_byte: &[usize],
    pos: usize,
    limit: usize,
) -> usize {
    if pos == 0 || text[..char_to_byte[pos]].ends_with(char::is_whitespace) {
        return pos;
    }
    let region = &text[char_to_byte[pos]..char_to_byte[limit]];
    match region.find(char::is_whitespace) {
        Some(ws) => {
            let next =
                char_to_byte.partition_point(|&b| b <= char_to_byte[pos] + ws);
            if next < limit { next } else { pos }
        }
        None => pos,
    }
}

// -- Token limit --

/// Subdivide `text` until every piece measures at most `max_tokens`.
///
/// Returns each piece with its token length. Pieces are cut at the last
/// whitespace inside the longest fitting prefix when there is one.
pub fn limit_tokens<'a>(
    text: &'a str,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Result<Vec<(&'a str, usize)>> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let tokens = counter.count(rest)?;
        if tokens <= max_tokens {
            pieces.push((rest, tokens));
            break;
        }

        let prefix = counter.truncate(rest, max_tokens)?;
        let at_word_end = rest[prefix.len()..].starts_with(char::is_whitespace);
        let cut = match prefix.rfind(char::is_whitespace) {
            _ if at_word_end => prefix.len(),
            Some(ws) if !prefix[..ws].trim().is_empty() => ws,
            _ => prefix.len(),
        };
        if cut == 0 {
            return Err(Error::Tokenizer(format!(
                "no prefix of {:?} fits in {max_tokens} tokens",
                rest.chars().take(20).collect::<String>()
            )));
        }

        let piece = rest[..cut].trim_end();
        pieces.push((piece, counter.count(piece)?));
        rest = rest[cut..].trim_start();
    }

    Ok(pieces)
}
