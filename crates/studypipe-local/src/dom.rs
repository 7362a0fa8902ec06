//! Owned HTML document snapshot.
//!
//! Parsing rides on `scraper` (html5ever underneath), but its tree is
//! read-only; the highlighter needs to splice mark elements in place, so the
//! parse is converted into this small owned tree. Serialization covers what
//! page annotation needs: elements, attributes, text, void tags, raw text
//! inside script/style. Comments and doctypes are dropped.

use html_scraper::{ElementRef, Html};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Lowercase tag name.
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|t| t == class))
    }

    /// Concatenated text of all descendant text nodes, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Element,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

impl Document {
    /// Parse HTML into an owned tree. html5ever is error-recovering, so this
    /// is total; malformed input yields the tree a browser would build.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        Self {
            root: convert_element(parsed.root_element()),
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// The `<body>` element, if the parse produced one (documents always
    /// have one; it only goes missing for exotic fragment input).
    pub fn body(&self) -> Option<&Element> {
        self.root.children.iter().find_map(|n| match n {
            Node::Element(e) if e.name == "body" => Some(e),
            _ => None,
        })
    }

    pub(crate) fn body_index(&self) -> Option<usize> {
        self.root.children.iter().position(|n| matches!(n, Node::Element(e) if e.name == "body"))
    }

    pub fn text_content(&self) -> String {
        self.root.text_content()
    }

    /// Navigate to the parent element of the node at `path`, returning the
    /// parent and the final child index. Paths are child-index chains rooted
    /// at the document element.
    pub(crate) fn parent_at_path_mut(&mut self, path: &[usize]) -> Option<(&mut Element, usize)> {
        let (last, parents) = path.split_last()?;
        let mut cur = &mut self.root;
        for &i in parents {
            cur = match cur.children.get_mut(i)? {
                Node::Element(e) => e,
                Node::Text(_) => return None,
            };
        }
        if *last >= cur.children.len() {
            return None;
        }
        Some((cur, *last))
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_element(&self.root, &mut out);
        out
    }
}

fn convert_element(el: ElementRef) -> Element {
    let name = el.value().name().to_ascii_lowercase();
    let attrs = el
        .value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut children = Vec::new();
    for child in el.children() {
        match child.value() {
            html_scraper::Node::Text(t) => children.push(Node::Text(t.text.to_string())),
            html_scraper::Node::Element(_) => {
                if let Some(c) = ElementRef::wrap(child) {
                    children.push(Node::Element(convert_element(c)));
                }
            }
            _ => {}
        }
    }
    Element {
        name,
        attrs,
        children,
    }
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (k, v) in &el.attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        escape_attr(v, out);
        out.push('"');
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&el.name.as_str()) {
        return;
    }
    // Script/style bodies must round-trip unescaped or the page breaks.
    let raw_text = matches!(el.name.as_str(), "script" | "style");
    for child in &el.children {
        match child {
            Node::Text(t) if raw_text => out.push_str(t),
            Node::Text(t) => escape_text(t, out),
            Node::Element(e) => write_element(e, out),
        }
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}
