//! Readable-text extraction from fetched HTML.
//!
//! The page is read from the most article-like landmark available, with
//! navigation chrome skipped. Two fallbacks sit behind that: the raw body
//! text when the stripped walk comes up empty, and an html2text rendering
//! when even the body has nothing. Downstream stages only ever see the
//! normalized result.

use std::io::Cursor;

use html_scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use studypipe_core::PageDump;

use crate::condense::normalize;

/// Extracted page text is clipped here; enough for any condense cap while
/// keeping pathological pages bounded.
pub const PAGE_TEXT_CAP: usize = 60_000;

/// Landmark selectors tried in priority order before falling back to body.
const MAIN_ROOTS: &[&str] = &["article", "main", "#main-content", "[role=main]"];

/// Subtrees skipped while collecting readable text.
const BOILERPLATE: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "iframe", "svg",
    "canvas", "video", "audio", "picture", "source",
];

#[derive(Debug, Clone, Serialize)]
pub struct PageExtract {
    pub title: String,
    /// Normalized readable text, clipped to [`PAGE_TEXT_CAP`] characters.
    pub text: String,
    /// Which path produced the text: "main", "body", or "rendered".
    pub engine: &'static str,
    pub truncated: bool,
    pub warnings: Vec<&'static str>,
}

pub fn html_to_text(html: &str, width: usize) -> String {
    // html2text expects bytes; Cursor avoids allocating a second large buffer.
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Conservative sniff for HTML-shaped input, for callers handed a file or a
/// body with no content type.
pub fn looks_like_html(s: &str) -> bool {
    let rest = s.trim_start();
    ["<!doctype", "<html", "<head", "<body"]
        .iter()
        .any(|p| rest.get(..p.len()).is_some_and(|pre| pre.eq_ignore_ascii_case(p)))
}

fn select_first<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next()
}

fn choose_main_root(doc: &Html) -> Option<ElementRef<'_>> {
    MAIN_ROOTS.iter().find_map(|s| select_first(doc, s))
}

fn skip_boilerplate(el: &html_scraper::node::Element) -> bool {
    let name = el.name();
    if BOILERPLATE.contains(&name) {
        return true;
    }
    // Search widgets masquerade as content-bearing forms.
    name == "form" && el.attr("role") == Some("search")
}

fn collect_readable_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            html_scraper::Node::Text(t) => out.push_str(&t.text),
            html_scraper::Node::Element(e) => {
                if skip_boilerplate(e) {
                    continue;
                }
                if let Some(c) = ElementRef::wrap(child) {
                    collect_readable_text(c, out);
                }
            }
            _ => {}
        }
    }
}

fn page_title(doc: &Html) -> String {
    select_first(doc, "title")
        .map(|el| norm_ws(&el.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default()
}

fn truncate_to_chars(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => (s[..i].to_string(), true),
        None => (s.to_string(), false),
    }
}

/// Extract readable text from raw HTML.
pub fn extract_page(html: &str) -> PageExtract {
    let doc = Html::parse_document(html);
    let mut warnings: Vec<&'static str> = Vec::new();
    let title = page_title(&doc);

    let root = choose_main_root(&doc)
        .or_else(|| select_first(&doc, "body"))
        .unwrap_or_else(|| doc.root_element());
    let mut raw = String::new();
    collect_readable_text(root, &mut raw);
    let mut engine = "main";
    let mut text = normalize(&raw);

    if text.is_empty() {
        if let Some(body) = select_first(&doc, "body") {
            let body_raw: String = body.text().collect();
            text = normalize(&body_raw);
            if !text.is_empty() {
                engine = "body";
                warnings.push("main_empty");
            }
        }
    }
    if text.is_empty() {
        text = normalize(&html_to_text(html, 100));
        if !text.is_empty() {
            engine = "rendered";
            warnings.push("rendered_fallback");
        }
    }

    let (text, truncated) = truncate_to_chars(&text, PAGE_TEXT_CAP);
    PageExtract {
        title,
        text,
        engine,
        truncated,
        warnings,
    }
}

/// Extraction shaped for the pipeline: title, url, and readable text.
pub fn extract_dump(html: &str, url: &str) -> PageDump {
    let ex = extract_page(html);
    PageDump {
        title: ex.title,
        url: url.to_string(),
        text: ex.text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_wins_over_an_earlier_main() {
        let html = "<html><body>\
<main><p>Sidebar summary text lives here.</p></main>\
<article><p>The article body is the real content.</p></article>\
</body></html>";
        let ex = extract_page(html);
        assert_eq!(ex.engine, "main");
        assert!(ex.text.contains("real content"));
        assert!(!ex.text.contains("Sidebar"));
    }

    #[test]
    fn boilerplate_inside_the_chosen_root_is_skipped() {
        let html = "<html><body><article>\
<nav><a href=\"/x\">Home</a></nav>\
<p>Hello world, this paragraph stays.</p>\
<footer>Privacy notice</footer>\
</article></body></html>";
        let ex = extract_page(html);
        assert!(ex.text.contains("Hello world"));
        assert!(!ex.text.contains("Home"));
        assert!(!ex.text.contains("Privacy"));
    }

    #[test]
    fn body_is_the_root_when_no_landmark_exists() {
        let html = "<html><body>\
<header>Site header</header>\
<p>Plain body content without landmarks.</p>\
<footer>Footer links</footer>\
</body></html>";
        let ex = extract_page(html);
        assert_eq!(ex.engine, "main");
        assert!(ex.text.contains("Plain body content"));
        assert!(!ex.text.contains("Site header"));
        assert!(!ex.text.contains("Footer links"));
    }

    #[test]
    fn search_forms_are_treated_as_chrome() {
        let html = "<html><body>\
<form role=\"search\"><input><button>Search this site</button></form>\
<p>Content paragraph.</p></body></html>";
        let ex = extract_page(html);
        assert!(ex.text.contains("Content paragraph."));
        assert!(!ex.text.contains("Search this site"));
    }

    #[test]
    fn empty_landmark_falls_back_to_raw_body_text() {
        let html = "<html><body><main></main>\
<nav>Only nav text here</nav></body></html>";
        let ex = extract_page(html);
        assert_eq!(ex.engine, "body");
        assert!(ex.warnings.contains(&"main_empty"));
        assert!(ex.text.contains("Only nav text here"));
    }

    #[test]
    fn id_and_role_selectors_are_honored() {
        let html = "<html><body>\
<div id=\"main-content\"><p>Id-addressed content.</p></div>\
</body></html>";
        assert!(extract_page(html).text.contains("Id-addressed content."));

        let html = "<html><body>\
<div role=\"main\"><p>Role-addressed content.</p></div>\
</body></html>";
        assert!(extract_page(html).text.contains("Role-addressed content."));
    }

    #[test]
    fn long_pages_are_clipped_and_flagged() {
        let body = "word ".repeat(14_000);
        let html = format!("<html><body><p>{body}</p></body></html>");
        let ex = extract_page(&html);
        assert!(ex.truncated);
        assert_eq!(ex.text.chars().count(), PAGE_TEXT_CAP);
    }

    #[test]
    fn title_is_whitespace_normalized() {
        let html = "<html><head><title>  My   Page \n</title></head><body><p>x</p></body></html>";
        assert_eq!(extract_page(html).title, "My Page");
    }

    #[test]
    fn looks_like_html_sniffs_common_prefixes() {
        assert!(looks_like_html("<!doctype html><html>"));
        assert!(looks_like_html("   <HTML><body>x</body></html>"));
        assert!(looks_like_html("\n<body>x</body>"));
        assert!(!looks_like_html("{\"a\":1}"));
        assert!(!looks_like_html("just some prose"));
        assert!(!looks_like_html(""));
    }

    #[test]
    fn extract_dump_carries_the_url_through() {
        let html = "<html><head><title>T</title></head><body><p>Body text.</p></body></html>";
        let dump = extract_dump(html, "https://example.com/a");
        assert_eq!(dump.url, "https://example.com/a");
        assert_eq!(dump.title, "T");
        assert!(dump.text.contains("Body text."));
    }
}
