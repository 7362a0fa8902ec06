//! Whitespace normalization and extractive condensing.
//!
//! The condenser is a cheap, deterministic pre-pass that shrinks page text
//! before it is sent to a model: one representative line per heading, the
//! first sentence per paragraph, duplicates dropped, output capped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Default output cap for condensed text, in characters.
pub const DEFAULT_CHAR_CAP: usize = 8000;
/// Lines shorter than this are noise (menu fragments, timestamps) and skipped.
pub const MIN_LINE_CHARS: usize = 25;
/// Lines at most this long without terminal punctuation count as headings.
pub const HEADING_MAX_CHARS: usize = 90;

static HORIZ_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("horiz ws regex"));
static LINE_INDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]+").expect("indent regex"));
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run regex"));

/// Normalize whitespace: drop carriage returns, map NBSP to space, collapse
/// horizontal runs, strip indentation after newlines, squeeze blank-line runs
/// to one blank line, trim. Total and idempotent.
pub fn normalize(input: &str) -> String {
    let s = input.replace('\r', "").replace('\u{00a0}', " ");
    let s = HORIZ_WS.replace_all(&s, " ");
    let s = LINE_INDENT.replace_all(&s, "\n");
    let s = BLANK_RUN.replace_all(&s, "\n\n");
    s.trim().to_string()
}

fn is_sentence_open(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '\u{201c}' | '"' | '(' | '[')
}

/// First sentence of a line. A boundary is terminal punctuation followed by
/// whitespace and something that looks like a fresh sentence start (capital,
/// digit, opening quote or bracket). Returns the whole line when no boundary
/// is found; abbreviations mid-line are an accepted false negative.
pub fn first_sentence(line: &str) -> &str {
    for (i, c) in line.char_indices() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = i + c.len_utf8();
        let rest = &line[end..];
        let ws: usize = rest
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(|c| c.len_utf8())
            .sum();
        if ws == 0 {
            continue;
        }
        if rest[ws..].chars().next().is_some_and(is_sentence_open) {
            return &line[..end];
        }
    }
    line
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Clip to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => s[..i].to_string(),
        None => s.to_string(),
    }
}

/// Condense normalized-ish text to at most `char_cap` characters.
///
/// Per line: short lines are dropped; heading-shaped lines are kept whole;
/// everything else contributes its first sentence. Repeats are dropped via
/// case-insensitive keys, headings and sentences deduplicated separately.
/// Accumulation stops once the cap is reached; the tail line may still be
/// clipped mid-sentence by the final truncation (accepted lossy behavior).
pub fn condense(raw: &str, char_cap: usize) -> String {
    let text = normalize(raw);
    let mut dedup: HashSet<String> = HashSet::new();
    let mut keep: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for line in text.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
        if char_len(line) < MIN_LINE_CHARS {
            continue;
        }
        let is_heading =
            char_len(line) <= HEADING_MAX_CHARS && !line.ends_with(['.', '!', '?']);
        if is_heading {
            let key = format!("H|{}", line.to_lowercase());
            if dedup.insert(key) {
                total += char_len(line) + usize::from(!keep.is_empty());
                keep.push(line);
            }
            continue;
        }
        let first = first_sentence(line).trim();
        let key = format!("S|{}", first.to_lowercase());
        if dedup.insert(key) {
            total += char_len(first) + usize::from(!keep.is_empty());
            keep.push(first);
        }
        if total >= char_cap {
            break;
        }
    }

    let condensed = keep.join("\n");
    if char_len(&condensed) > char_cap {
        truncate_chars(&condensed, char_cap)
    } else {
        condensed
    }
}
