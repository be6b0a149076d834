//! HTML to clean-Markdown content pipeline for article pages.
//!
//! Stages: excise chrome, trim tail sections, strip file links, choose the
//! main content region, render Markdown by hand, then regex and per-line
//! cleanup. The pipeline is idempotent: feeding its output back through
//! produces the same text.

use anyhow::Result;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use ego_tree::{NodeId, NodeRef};

/// Tags removed wholesale wherever they appear.
const STRIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "meta", "link", "head", "nav", "header", "footer", "aside",
    "img", "figure", "audio", "video",
];

/// Wiki chrome removed by selector.
const STRIP_SELECTORS: &[&str] = &[
    "table.infobox",
    "div.navbox",
    "div.hatnote",
    "div.dablink",
    "div.ambox",
    "div.mbox-small",
    "div.sistersitebox",
    "div.reflist",
    "ol.references",
    "div.refbegin",
    "span.mw-editsection",
    "div.printfooter",
    "div.catlinks",
    "div#toc",
    "div.toc",
    "div.toccolours",
    "div[class^=\"thumb\"]",
    "div[class^=\"gallery\"]",
];

/// Section headings whose content is dropped from the article tail.
const TAIL_SECTIONS: &[&str] = &["see also", "references", "external links", "further reading"];

/// Link prefixes that mark media pages rather than articles.
const FILE_LINK_PREFIXES: &[&str] = &["/wiki/file:", "/wiki/image:", "/wiki/media:"];

/// Converts article HTML into cleaned Markdown.
pub struct ContentPipeline {
    min_content_length: usize,
    strip_selectors: Vec<Selector>,
    heading_selector: Selector,
    anchor_selector: Selector,
    paragraph_selector: Selector,
    root_selectors: Vec<Selector>,
    loose_root_selector: Selector,
    body_selector: Selector,
    bracket_patterns: Vec<Regex>,
    spaces_re: Regex,
    blank_runs_re: Regex,
    heading_space_re: Regex,
    bullet_space_re: Regex,
    numbered_space_re: Regex,
}

impl ContentPipeline {
    pub fn new(min_content_length: usize) -> Self {
        let mut strip_selectors = Vec::new();
        for tag in STRIP_TAGS {
            strip_selectors.push(Selector::parse(tag).expect("static selector"));
        }
        for selector in STRIP_SELECTORS {
            strip_selectors.push(Selector::parse(selector).expect("static selector"));
        }
        let root_selectors = [
            "div#mw-content-text > div.mw-parser-output",
            "div#mw-content-text",
            "div.mw-parser-output",
            "div#bodyContent",
        ]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect();
        let bracket_patterns = [
            r"\[\d+\]",
            r"(?i)\[citation needed\]",
            r"(?i)\[clarification needed\]",
            r"(?i)\[when\?\]",
            r"(?i)\[who\?\]",
            r"(?i)\[where\?\]",
            r"(?i)\[edit\]",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect();
        Self {
            min_content_length,
            strip_selectors,
            heading_selector: Selector::parse("h2, h3, h4").expect("static selector"),
            anchor_selector: Selector::parse("a[href]").expect("static selector"),
            paragraph_selector: Selector::parse("p").expect("static selector"),
            root_selectors,
            loose_root_selector: Selector::parse("main, article, div[class*=\"content\"]")
                .expect("static selector"),
            body_selector: Selector::parse("body").expect("static selector"),
            bracket_patterns,
            spaces_re: Regex::new(r"[ \t]+").expect("static regex"),
            blank_runs_re: Regex::new(r"\n{3,}").expect("static regex"),
            heading_space_re: Regex::new(r"^(#+)([^\s])").expect("static regex"),
            bullet_space_re: Regex::new(r"^([-*+])(\S)").expect("static regex"),
            numbered_space_re: Regex::new(r"^(\d+\.)(\S)").expect("static regex"),
        }
    }

    /// Run the full pipeline. Fails when the cleaned output trims below the
    /// configured minimum length.
    pub fn process(&self, html: &str) -> Result<String> {
        let mut document = Html::parse_document(html);

        self.remove_comments(&mut document);
        self.remove_chrome(&mut document);
        self.trim_tail_sections(&mut document);
        self.strip_file_links(&mut document);

        let markdown = self.render_from_root(&document);
        let cleaned = self.cleanup_text(&markdown);
        let finished = self.postprocess_lines(&cleaned);

        let trimmed_len = finished.trim().chars().count();
        if trimmed_len < self.min_content_length {
            warn!(
                chars = trimmed_len,
                minimum = self.min_content_length,
                "Content processing produced too little text"
            );
            anyhow::bail!(
                "Content processing produced only {trimmed_len} characters (minimum {})",
                self.min_content_length
            );
        }
        debug!(input = html.len(), output = finished.len(), "Processed article content");
        Ok(finished)
    }

    fn remove_comments(&self, document: &mut Html) {
        let ids: Vec<NodeId> = document
            .tree
            .root()
            .descendants()
            .filter(|node| node.value().is_comment())
            .map(|node| node.id())
            .collect();
        detach_all(document, ids);
    }

    fn remove_chrome(&self, document: &mut Html) {
        for selector in &self.strip_selectors {
            let ids: Vec<NodeId> = document.select(selector).map(|el| el.id()).collect();
            detach_all(document, ids);
        }
    }

    /// Remove "See also"-style headings together with everything up to the
    /// next heading of equal or higher rank.
    fn trim_tail_sections(&self, document: &mut Html) {
        let headings: Vec<(NodeId, u8)> = document
            .select(&self.heading_selector)
            .filter(|el| {
                let text = element_text(*el).trim().to_lowercase();
                TAIL_SECTIONS.contains(&text.as_str())
            })
            .map(|el| (el.id(), heading_rank(el.value().name())))
            .collect();

        for (heading_id, rank) in headings {
            let mut doomed = vec![heading_id];
            if let Some(heading) = document.tree.get(heading_id) {
                for sibling in heading.next_siblings() {
                    if let Some(element) = sibling.value().as_element() {
                        let sibling_rank = heading_rank(element.name());
                        if sibling_rank > 0 && sibling_rank <= rank {
                            break;
                        }
                    }
                    doomed.push(sibling.id());
                }
            }
            detach_all(document, doomed);
        }
    }

    fn strip_file_links(&self, document: &mut Html) {
        let ids: Vec<NodeId> = document
            .select(&self.anchor_selector)
            .filter(|el| {
                let href = el.value().attr("href").unwrap_or_default().to_lowercase();
                FILE_LINK_PREFIXES.iter().any(|prefix| href.starts_with(prefix))
            })
            .map(|el| el.id())
            .collect();
        detach_all(document, ids);
    }

    /// Pick the content root and render it to Markdown.
    fn render_from_root(&self, document: &Html) -> String {
        let mut out = String::new();
        if let Some(root) = self.choose_root(document) {
            render_children(*root, &mut out);
        } else {
            render_children(document.tree.root(), &mut out);
        }
        out
    }

    fn choose_root<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        for selector in &self.root_selectors {
            if let Some(root) = document.select(selector).next() {
                return Some(root);
            }
        }
        for candidate in document.select(&self.loose_root_selector) {
            if self.is_substantial(candidate) {
                return Some(candidate);
            }
        }
        document.select(&self.body_selector).next()
    }

    /// A loose candidate counts when it holds at least 100 characters of
    /// text and one paragraph of at least 20 characters.
    fn is_substantial(&self, candidate: ElementRef<'_>) -> bool {
        let total: usize = candidate.text().map(|t| t.chars().count()).sum();
        if total < 100 {
            return false;
        }
        candidate
            .select(&self.paragraph_selector)
            .any(|p| element_text(p).trim().chars().count() >= 20)
    }

    /// Regex cleanup over the rendered Markdown: editorial markers, runs of
    /// horizontal whitespace, runs of blank lines.
    fn cleanup_text(&self, markdown: &str) -> String {
        let mut text = markdown.to_string();
        for pattern in &self.bracket_patterns {
            text = pattern.replace_all(&text, "").into_owned();
        }
        text = self.spaces_re.replace_all(&text, " ").into_owned();
        text = self.blank_runs_re.replace_all(&text, "\n\n").into_owned();
        text
    }

    /// Per-line pass: trim, repair list/heading marker spacing, cap blank
    /// runs, end with exactly one newline.
    fn postprocess_lines(&self, text: &str) -> String {
        let mut lines: Vec<String> = Vec::new();
        for raw in text.split('\n') {
            let line = raw.trim();
            if line.is_empty() {
                if lines.last().is_some_and(|last| !last.is_empty()) {
                    lines.push(String::new());
                }
                continue;
            }
            let mut line = self.spaces_re.replace_all(line, " ").into_owned();
            line = self.heading_space_re.replace(&line, "$1 $2").into_owned();
            line = self.bullet_space_re.replace(&line, "$1 $2").into_owned();
            line = self.numbered_space_re.replace(&line, "$1 $2").into_owned();
            lines.push(line);
        }
        let joined = lines.join("\n");
        let collapsed = self.blank_runs_re.replace_all(&joined, "\n\n");
        let trimmed = collapsed.trim();
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}\n")
        }
    }
}

fn detach_all(document: &mut Html, ids: Vec<NodeId>) {
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn heading_rank(name: &str) -> u8 {
    match name {
        "h1" => 1,
        "h2" => 2,
        "h3" => 3,
        "h4" => 4,
        "h5" => 5,
        "h6" => 6,
        _ => 0,
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Keep an href only for wiki-internal article links: `/wiki/` prefix and no
/// colon anywhere (colons mark namespaces).
fn keep_href(href: &str) -> bool {
    href.starts_with("/wiki/") && !href.contains(':')
}

fn render_children(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        render_node(child, out);
    }
}

/// Hand-rolled Markdown renderer covering the fixed tag set. Unknown
/// elements are transparent containers; `*` and `_` are never escaped.
fn render_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&text.text),
        Node::Element(element) => match element.name() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = heading_rank(element.name()) as usize;
                ensure_blank_line(out);
                out.push_str(&"#".repeat(level));
                out.push(' ');
                render_children(node, out);
                ensure_blank_line(out);
            }
            "p" => {
                ensure_blank_line(out);
                render_children(node, out);
                ensure_blank_line(out);
            }
            "br" => out.push('\n'),
            "strong" | "b" => {
                out.push_str("**");
                render_children(node, out);
                out.push_str("**");
            }
            "em" | "i" => {
                out.push('*');
                render_children(node, out);
                out.push('*');
            }
            "u" => render_children(node, out),
            "ul" => {
                for child in node.children() {
                    if child.value().as_element().is_some_and(|el| el.name() == "li") {
                        out.push_str("\n- ");
                        render_children(child, out);
                    }
                }
                ensure_blank_line(out);
            }
            "ol" => {
                let mut index = 0usize;
                for child in node.children() {
                    if child.value().as_element().is_some_and(|el| el.name() == "li") {
                        index += 1;
                        out.push_str(&format!("\n{index}. "));
                        render_children(child, out);
                    }
                }
                ensure_blank_line(out);
            }
            // A stray list item outside any list still renders as a bullet.
            "li" => {
                out.push_str("\n- ");
                render_children(node, out);
            }
            "blockquote" => {
                let mut quoted = String::new();
                render_children(node, &mut quoted);
                ensure_blank_line(out);
                for line in quoted.trim().split('\n') {
                    out.push_str("> ");
                    out.push_str(line.trim());
                    out.push('\n');
                }
                ensure_blank_line(out);
            }
            "code" => {
                out.push('`');
                render_children(node, out);
                out.push('`');
            }
            "pre" => {
                ensure_blank_line(out);
                out.push_str("```\n");
                let mut body = String::new();
                render_children(node, &mut body);
                out.push_str(body.trim_end());
                out.push_str("\n```");
                ensure_blank_line(out);
            }
            "a" => {
                let href = element.attr("href").unwrap_or_default().to_string();
                if keep_href(&href) {
                    let mut label = String::new();
                    render_children(node, &mut label);
                    out.push('[');
                    out.push_str(&label);
                    out.push_str("](");
                    out.push_str(&href);
                    out.push(')');
                } else {
                    render_children(node, out);
                }
            }
            _ => render_children(node, out),
        },
        _ => {}
    }
}

fn ensure_blank_line(out: &mut String) {
    if out.is_empty() {
        return;
    }
    while out.ends_with(' ') || out.ends_with('\t') {
        out.pop();
    }
    if !out.ends_with("\n\n") {
        if out.ends_with('\n') {
            out.push('\n');
        } else {
            out.push_str("\n\n");
        }
    }
}
