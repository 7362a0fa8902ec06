//! Concept term mining.
//!
//! Candidates come from the summary (emphasis, inline code, Title Case
//! phrases, repeated n-grams); every candidate must then prove itself
//! against the full page text before it can be highlighted. Markdown
//! emphasis markers are the strongest signal since the summarizer tends to
//! bold exactly the terms worth studying.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

pub const DEFAULT_MAX_CONCEPTS: usize = 12;
pub const DEFAULT_MIN_CONCEPTS: usize = 6;
/// Cleaned terms shorter than this are dropped.
pub const MIN_TERM_CHARS: usize = 4;
/// Terms whose stopword share reaches this ratio are dropped.
pub const STOPWORD_RATIO: f64 = 0.5;
/// A single-word term must occur this often in the page to count as present.
pub const MIN_SINGLE_WORD_FREQ: usize = 2;
/// Backfill single words must be at least this long.
pub const BACKFILL_MIN_WORD_CHARS: usize = 5;
/// Tokens shorter than this never participate in n-grams.
pub const GRAM_MIN_TOKEN_CHARS: usize = 3;
/// An n-gram must repeat this often to be a backfill candidate.
pub const BACKFILL_MIN_GRAM_FREQ: usize = 2;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "to", "of", "in", "on", "for", "by", "with", "as", "at",
    "from", "that", "this", "these", "those", "is", "are", "was", "were", "be", "being", "been",
    "it", "its", "into", "over", "under", "about", "than", "then", "so", "such", "via", "we",
    "our", "you", "your", "their", "them", "they", "he", "she", "his", "her", "i", "me", "my",
    "mine", "yours", "ours",
];

// Generic section labels that carry no topical signal on their own.
const TITLE_SINGLE_BAN: &[&str] = &[
    "history",
    "overview",
    "introduction",
    "methods",
    "results",
    "discussion",
    "conclusion",
    "several",
    "these",
    "those",
    "this",
    "the",
    "domestic",
    "cats",
    "cat",
    "background",
];

static TOKEN_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z][a-z0-9-]+").expect("token regex"));
static BOLD_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+?)\*\*").expect("bold regex"));
static CODE_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+?)`").expect("code regex"));
// ASCII classes on purpose: terms are English-oriented and the cleaner must
// not admit arbitrary Unicode word characters.
static NON_TERM_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\- ]+").expect("term cleaner regex"));
static WS_RUN_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws run regex"));
static LEADING_ING_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+ing\b").expect("ing regex"));

fn is_stop(w: &str) -> bool {
    STOPWORDS.contains(&w)
}

/// Lowercased word tokens: a letter followed by letters, digits or hyphens.
/// Tokens are at least two chars and pure ASCII by construction.
pub fn tokenize_lower(s: &str) -> Vec<String> {
    let lower = s.to_lowercase();
    TOKEN_RX
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Strip everything but letters, digits, underscore, hyphen and space, then
/// collapse whitespace and trim.
pub fn clean_term(term: &str) -> String {
    let s = NON_TERM_RX.replace_all(term, " ");
    let s = WS_RUN_RX.replace_all(&s, " ");
    s.trim().to_string()
}

fn words_mostly_stop(term: &str) -> bool {
    let lower = term.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }
    let stop = words.iter().filter(|w| is_stop(w)).count();
    (stop as f64) / (words.len() as f64) >= STOPWORD_RATIO
}

/// Page text plus its token frequency table, built once per run and shared by
/// the presence filter and the backfill miner.
pub struct PageIndex {
    raw: String,
    freq: IndexMap<String, usize>,
}

impl PageIndex {
    pub fn new(page_text: &str) -> Self {
        let mut freq: IndexMap<String, usize> = IndexMap::new();
        for t in tokenize_lower(page_text) {
            *freq.entry(t).or_insert(0) += 1;
        }
        Self {
            raw: page_text.to_string(),
            freq,
        }
    }

    fn word_freq(&self, word_lower: &str) -> usize {
        self.freq.get(word_lower).copied().unwrap_or(0)
    }

    /// Presence check: multi-word terms need one whole-phrase match in the
    /// page; single words need to recur (one mention is not a concept).
    pub fn appears(&self, term: &str) -> bool {
        if term.contains(' ') {
            let pattern = format!(r"\b{}\b", regex::escape(term));
            RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map(|rx| rx.is_match(&self.raw))
                .unwrap_or(false)
        } else {
            self.word_freq(&term.to_lowercase()) >= MIN_SINGLE_WORD_FREQ
        }
    }
}

/// Read one Title Case word (`[A-Z][a-z]+`) starting at `start`; returns the
/// exclusive end index of the maximal lowercase run.
fn read_title_word(chars: &[char], start: usize) -> Option<usize> {
    if !chars.get(start)?.is_ascii_uppercase() {
        return None;
    }
    let mut j = start + 1;
    while j < chars.len() && chars[j].is_ascii_lowercase() {
        j += 1;
    }
    (j > start + 1).then_some(j)
}

/// Mine Title Case phrases of one to three words. A phrase must be bounded by
/// non-letters on both sides; when a longer phrase fails its right boundary,
/// the shorter prefix phrase is tried instead.
fn mine_title_case(s: &str, out: &mut Vec<(String, i32)>) {
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len();
    let mut i = 0usize;
    while i < n {
        if !chars[i].is_ascii_uppercase() || (i > 0 && chars[i - 1].is_ascii_alphabetic()) {
            i += 1;
            continue;
        }
        let Some(first_end) = read_title_word(&chars, i) else {
            i += 1;
            continue;
        };
        let mut word_ends = vec![first_end];
        let mut pos = first_end;
        while word_ends.len() < 3 {
            let mut j = pos;
            while j < n && chars[j].is_whitespace() {
                j += 1;
            }
            if j == pos {
                break;
            }
            let Some(e) = read_title_word(&chars, j) else {
                break;
            };
            word_ends.push(e);
            pos = e;
        }
        let accepted = word_ends
            .iter()
            .rev()
            .find(|&&e| e >= n || !chars[e].is_ascii_alphabetic())
            .copied();
        match accepted {
            Some(e) => {
                let phrase: String = chars[i..e].iter().collect();
                let t = clean_term(&phrase);
                if !t.is_empty() {
                    let wcount = t.split(' ').count();
                    let banned =
                        wcount == 1 && TITLE_SINGLE_BAN.contains(&t.to_lowercase().as_str());
                    if !banned {
                        out.push((t, if wcount >= 2 { 4 } else { 3 }));
                    }
                }
                i = e;
            }
            None => i += 1,
        }
    }
}

/// Mine repeated bigrams/trigrams of content tokens. Trigrams start at base 3,
/// bigrams at 2; repetition adds up to 3; grams led by an "-ing" word lose a
/// point (usually verb phrases, rarely concepts).
fn mine_grams(toks: &[String], out: &mut Vec<(String, i32)>) {
    let mut grams: IndexMap<String, usize> = IndexMap::new();
    for w in toks.windows(2) {
        let (a, b) = (w[0].as_str(), w[1].as_str());
        if is_stop(a) || is_stop(b) {
            continue;
        }
        if a.len() < GRAM_MIN_TOKEN_CHARS || b.len() < GRAM_MIN_TOKEN_CHARS {
            continue;
        }
        *grams.entry(format!("{a} {b}")).or_insert(0) += 1;
    }
    for w in toks.windows(3) {
        let (a, b, c) = (w[0].as_str(), w[1].as_str(), w[2].as_str());
        if is_stop(a) || is_stop(b) || is_stop(c) {
            continue;
        }
        if a.len() < GRAM_MIN_TOKEN_CHARS
            || b.len() < GRAM_MIN_TOKEN_CHARS
            || c.len() < GRAM_MIN_TOKEN_CHARS
        {
            continue;
        }
        *grams.entry(format!("{a} {b} {c}")).or_insert(0) += 1;
    }
    for (g, f) in &grams {
        let penalty = i32::from(LEADING_ING_RX.is_match(g));
        let base = if g.split(' ').count() == 3 { 3 } else { 2 };
        out.push((g.clone(), base + (*f).min(3) as i32 - penalty));
    }
}

/// Clean, filter and score candidates. Per-term score is the max across
/// sources; first-seen order is preserved so later ties stay deterministic.
fn score_candidates(cands: Vec<(String, i32)>, index: &PageIndex) -> IndexMap<String, i32> {
    let mut seen: IndexMap<String, i32> = IndexMap::new();
    for (term, score) in cands {
        let key = clean_term(&term);
        if key.is_empty() || key.chars().count() < MIN_TERM_CHARS {
            continue;
        }
        if key.chars().all(|c| c.is_ascii_lowercase()) && is_stop(&key) {
            continue;
        }
        if words_mostly_stop(&key) {
            continue;
        }
        if !index.appears(&key) {
            continue;
        }
        let entry = seen.entry(key).or_insert(0);
        *entry = (*entry).max(score);
    }
    seen
}

fn top_by_score(seen: IndexMap<String, i32>, max: usize) -> Vec<String> {
    let mut entries: Vec<(String, i32)> = seen.into_iter().collect();
    entries.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.0.chars().count().cmp(&a.0.chars().count()))
    });
    entries.into_iter().take(max).map(|(k, _)| k).collect()
}

/// Extract up to `max` concept terms from a summary, verified against the
/// full page text. Returned in rank order (score desc, then length desc).
pub fn extract_key_concepts(summary: &str, page_text: &str, max: usize) -> Vec<String> {
    let index = PageIndex::new(page_text);
    let mut candidates: Vec<(String, i32)> = Vec::new();

    for cap in BOLD_RX.captures_iter(summary) {
        let t = clean_term(&cap[1]);
        if !t.is_empty() {
            candidates.push((t, 6));
        }
    }
    for cap in CODE_RX.captures_iter(summary) {
        let t = clean_term(&cap[1]);
        if !t.is_empty() {
            candidates.push((t, 5));
        }
    }
    mine_title_case(summary, &mut candidates);
    mine_grams(&tokenize_lower(summary), &mut candidates);

    top_by_score(score_candidates(candidates, &index), max)
}

/// Top up `concepts` to at least `min` unique terms (case-insensitive) using
/// frequent terms from the page itself: repeated bigrams first, then longer
/// repeated single words. Existing entries are never reordered or removed.
pub fn ensure_min_concepts(concepts: &mut Vec<String>, page_text: &str, min: usize) {
    let mut have: HashSet<String> = concepts.iter().map(|c| c.to_lowercase()).collect();
    if have.len() >= min {
        return;
    }

    let toks = tokenize_lower(page_text);
    let mut freq: IndexMap<&str, usize> = IndexMap::new();
    for t in &toks {
        *freq.entry(t.as_str()).or_insert(0) += 1;
    }

    let mut singles: Vec<(&str, usize)> = freq
        .iter()
        .filter(|(w, c)| !is_stop(w) && w.len() >= BACKFILL_MIN_WORD_CHARS && **c >= MIN_SINGLE_WORD_FREQ)
        .map(|(w, c)| (*w, *c))
        .collect();
    singles.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.len().cmp(&a.0.len())));

    let mut grams: IndexMap<String, usize> = IndexMap::new();
    for w in toks.windows(2) {
        let (a, b) = (w[0].as_str(), w[1].as_str());
        if is_stop(a) || is_stop(b) || a.len() < GRAM_MIN_TOKEN_CHARS || b.len() < GRAM_MIN_TOKEN_CHARS
        {
            continue;
        }
        *grams.entry(format!("{a} {b}")).or_insert(0) += 1;
    }
    let mut bigrams: Vec<(String, usize)> = grams
        .into_iter()
        .filter(|(_, c)| *c >= BACKFILL_MIN_GRAM_FREQ)
        .collect();
    bigrams.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.len().cmp(&a.0.len())));

    let pool = bigrams
        .into_iter()
        .map(|(g, _)| g)
        .chain(singles.into_iter().map(|(w, _)| w.to_string()));
    for term in pool {
        if have.len() >= min {
            break;
        }
        if have.insert(term.clone()) {
            concepts.push(term);
        }
    }
}
