//! First-occurrence concept highlighting over a document snapshot.
//!
//! Highlighting is planned against an immutable walk of the tree, then
//! applied as text-node splices. Re-running with a new term list is
//! idempotent because every run clears previous marks first.

use std::collections::HashSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use studypipe_core::{Error, Result};

use crate::dom::{Document, Element, Node};

/// Class carried by every mark this module plants; clearing keys off it.
pub const MARK_CLASS: &str = "concept-mark";
/// Attribute holding the caller-facing form of the marked concept.
pub const CONCEPT_ATTR: &str = "data-concept";

/// Subtrees that never receive marks. `mark` is in the list so runs never
/// nest highlights, ours or anyone else's.
const SKIP_ELEMENTS: &[&str] = &["script", "style", "noscript", "iframe", "code", "pre", "mark"];

static INLINE_DISPLAY_NONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)display\s*:\s*none").expect("display:none regex"));

/// One planned splice: wrap `text_node[start..end]` in a mark element.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkInstruction {
    /// Child-index chain from the document element to the text node.
    pub path: Vec<usize>,
    /// Byte range of the match inside the text node.
    pub start: usize,
    pub end: usize,
    /// Normalized term this mark satisfies.
    pub key: String,
    /// Original caller spelling, written to the data-concept attribute.
    pub display: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HighlightOutcome {
    /// Distinct terms after normalization.
    pub requested: usize,
    pub marks_placed: usize,
    /// Terms with no visible occurrence, in caller spelling.
    pub missed: Vec<String>,
}

/// Collapse a term to its match key: lowercase, inner whitespace runs to one
/// space, outer whitespace dropped.
fn norm_term(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dedup terms case- and whitespace-insensitively, keeping the first spelling
/// seen for each key. Order is the caller's, which decides match priority.
fn dedup_terms(terms: &[String]) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    for t in terms {
        let key = norm_term(t);
        if key.is_empty() {
            continue;
        }
        map.entry(key).or_insert_with(|| t.trim().to_string());
    }
    map
}

/// One alternation over all wanted terms. Alternation order is term order,
/// and the regex engine prefers earlier branches at equal start positions,
/// so earlier-listed terms win ties.
fn build_pattern(wanted: &IndexMap<String, String>) -> Result<Regex> {
    let alts: Vec<String> = wanted.keys().map(|k| regex::escape(k)).collect();
    let pattern = format!(r"\b(?:{})\b", alts.join("|"));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Highlight(format!("term pattern failed: {e}")))
}

fn is_hidden(el: &Element) -> bool {
    if el.attr("hidden").is_some() {
        return true;
    }
    el.attr("style").is_some_and(|s| INLINE_DISPLAY_NONE.is_match(s))
}

fn skip_subtree(el: &Element) -> bool {
    SKIP_ELEMENTS.contains(&el.name.as_str()) || is_hidden(el)
}

/// Plan marks without touching the tree: first visible occurrence of each
/// term, in document order, stopping early once every term is satisfied.
pub fn plan_marks(doc: &Document, terms: &[String]) -> Result<Vec<MarkInstruction>> {
    let wanted = dedup_terms(terms);
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let rx = build_pattern(&wanted)?;
    let mut plan = Vec::new();
    let mut done: HashSet<String> = HashSet::new();

    // Marks belong in the body; head text (title, metadata) is never visible.
    let mut path: Vec<usize> = Vec::new();
    match doc.body_index() {
        Some(i) => {
            let Some(Node::Element(body)) = doc.root().children.get(i) else {
                return Ok(plan);
            };
            if skip_subtree(body) {
                return Ok(plan);
            }
            path.push(i);
            walk(body, &mut path, &rx, &wanted, &mut done, &mut plan);
        }
        None => {
            walk(doc.root(), &mut path, &rx, &wanted, &mut done, &mut plan);
        }
    }
    Ok(plan)
}

/// Returns true once all wanted terms are planned, so callers can stop.
fn walk(
    el: &Element,
    path: &mut Vec<usize>,
    rx: &Regex,
    wanted: &IndexMap<String, String>,
    done: &mut HashSet<String>,
    plan: &mut Vec<MarkInstruction>,
) -> bool {
    for (i, child) in el.children.iter().enumerate() {
        match child {
            Node::Element(e) => {
                if skip_subtree(e) {
                    continue;
                }
                path.push(i);
                let finished = walk(e, path, rx, wanted, done, plan);
                path.pop();
                if finished {
                    return true;
                }
            }
            Node::Text(t) => {
                for m in rx.find_iter(t) {
                    let key = norm_term(m.as_str());
                    if done.contains(&key) {
                        continue;
                    }
                    let Some(display) = wanted.get(&key) else {
                        continue;
                    };
                    done.insert(key.clone());
                    let mut node_path = path.clone();
                    node_path.push(i);
                    plan.push(MarkInstruction {
                        path: node_path,
                        start: m.start(),
                        end: m.end(),
                        key,
                        display: display.clone(),
                    });
                    if done.len() == wanted.len() {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Splice planned marks into the tree. Nodes later in document order are
/// spliced first so pending paths stay valid. Returns the number of marks
/// placed; a stale plan (paths that no longer resolve) is a hard error.
pub fn apply_marks(doc: &mut Document, plan: &[MarkInstruction]) -> Result<usize> {
    let mut by_path: IndexMap<&[usize], Vec<&MarkInstruction>> = IndexMap::new();
    for ins in plan {
        by_path.entry(ins.path.as_slice()).or_default().push(ins);
    }
    let mut groups: Vec<(&[usize], Vec<&MarkInstruction>)> = by_path.into_iter().collect();
    groups.sort_by(|a, b| b.0.cmp(a.0));

    let mut placed = 0usize;
    for (path, mut instrs) in groups {
        instrs.sort_by_key(|ins| ins.start);
        let (parent, idx) = doc
            .parent_at_path_mut(path)
            .ok_or_else(|| Error::Highlight("mark target no longer exists".to_string()))?;
        let text = match parent.children.get(idx) {
            Some(Node::Text(t)) => t.clone(),
            _ => return Err(Error::Highlight("mark target is not a text node".to_string())),
        };
        let mut replacement: Vec<Node> = Vec::new();
        let mut consumed = 0usize;
        for ins in instrs {
            if ins.start < consumed || ins.end > text.len() || ins.start >= ins.end {
                return Err(Error::Highlight("mark range out of bounds".to_string()));
            }
            if ins.start > consumed {
                replacement.push(Node::Text(text[consumed..ins.start].to_string()));
            }
            // The mark wraps the page's own casing; the attribute carries
            // the caller's spelling.
            replacement.push(Node::Element(Element {
                name: "mark".to_string(),
                attrs: vec![
                    ("class".to_string(), MARK_CLASS.to_string()),
                    (CONCEPT_ATTR.to_string(), ins.display.clone()),
                ],
                children: vec![Node::Text(text[ins.start..ins.end].to_string())],
            }));
            placed += 1;
            consumed = ins.end;
        }
        if consumed < text.len() {
            replacement.push(Node::Text(text[consumed..].to_string()));
        }
        parent.children.splice(idx..=idx, replacement);
    }
    Ok(placed)
}

/// Remove every mark this module plants, merging the freed text back into
/// its neighbors. Returns how many marks were removed. Page text content is
/// unchanged byte for byte.
pub fn clear_marks(doc: &mut Document) -> usize {
    fn push_text(nodes: &mut Vec<Node>, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(prev)) = nodes.last_mut() {
            prev.push_str(&text);
        } else {
            nodes.push(Node::Text(text));
        }
    }

    fn clear_in(el: &mut Element) -> usize {
        let mut removed = 0;
        let old = std::mem::take(&mut el.children);
        let mut merged: Vec<Node> = Vec::with_capacity(old.len());
        for child in old {
            match child {
                Node::Element(e) if e.name == "mark" && e.has_class(MARK_CLASS) => {
                    removed += 1;
                    push_text(&mut merged, e.text_content());
                }
                Node::Element(mut e) => {
                    removed += clear_in(&mut e);
                    merged.push(Node::Element(e));
                }
                Node::Text(t) => push_text(&mut merged, t),
            }
        }
        el.children = merged;
        removed
    }

    clear_in(doc.root_mut())
}

pub fn count_marks(doc: &Document) -> usize {
    fn count_in(el: &Element) -> usize {
        let mut n = 0;
        for child in &el.children {
            if let Node::Element(e) = child {
                if e.name == "mark" && e.has_class(MARK_CLASS) {
                    n += 1;
                }
                n += count_in(e);
            }
        }
        n
    }
    count_in(doc.root())
}

/// Clear previous marks, then plan and apply fresh ones for `terms`.
pub fn highlight_terms(doc: &mut Document, terms: &[String]) -> Result<HighlightOutcome> {
    clear_marks(doc);
    let wanted = dedup_terms(terms);
    let plan = plan_marks(doc, terms)?;
    let placed = apply_marks(doc, &plan)?;
    let satisfied: HashSet<&str> = plan.iter().map(|ins| ins.key.as_str()).collect();
    let missed = wanted
        .iter()
        .filter(|(key, _)| !satisfied.contains(key.as_str()))
        .map(|(_, display)| display.clone())
        .collect();
    Ok(HighlightOutcome {
        requested: wanted.len(),
        marks_placed: placed,
        missed,
    })
}

/// Parse, highlight, serialize. The string-level entry point used by the CLI.
pub fn annotate_html(html: &str, terms: &[String]) -> Result<(String, HighlightOutcome)> {
    let mut doc = Document::parse(html);
    let outcome = highlight_terms(&mut doc, terms)?;
    Ok((doc.to_html(), outcome))
}
