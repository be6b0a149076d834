//! Page-level processing: classification, category handling, the content
//! pipeline, and language filtering.

pub mod category;
pub mod content;
pub mod language;

pub use category::{CategoryHandler, CategoryOutcome};
pub use content::ContentPipeline;
pub use language::LanguageFilter;

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// What kind of page a fetched body turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    Category,
    Article,
    Unknown,
}

/// Classifies a fetched page as category or article.
pub struct PageClassifier {
    subcategories: Selector,
    pages: Selector,
    media: Selector,
    tree_tag: Selector,
    h2: Selector,
    first_heading: Selector,
    content_text: Selector,
    parser_output: Selector,
    paragraphs: Selector,
}

impl PageClassifier {
    pub fn new() -> Self {
        Self {
            subcategories: Selector::parse("div#mw-subcategories").expect("static selector"),
            pages: Selector::parse("div#mw-pages").expect("static selector"),
            media: Selector::parse("div#mw-category-media").expect("static selector"),
            tree_tag: Selector::parse(".CategoryTreeTag").expect("static selector"),
            h2: Selector::parse("h2").expect("static selector"),
            first_heading: Selector::parse("h1#firstHeading").expect("static selector"),
            content_text: Selector::parse("div#mw-content-text").expect("static selector"),
            parser_output: Selector::parse("div.mw-parser-output").expect("static selector"),
            paragraphs: Selector::parse("p").expect("static selector"),
        }
    }

    /// Decide what a fetched page is. Rules run in order; URL evidence wins,
    /// then category markup, then the first heading, then article markup.
    pub fn classify(&self, body: &str, url: &str) -> PageClass {
        if url.contains("/Category:") {
            return PageClass::Category;
        }
        if body.trim().is_empty() {
            return PageClass::Unknown;
        }

        let document = Html::parse_document(body);

        let has_category_container = document.select(&self.subcategories).next().is_some()
            || document.select(&self.pages).next().is_some()
            || document.select(&self.media).next().is_some()
            || document.select(&self.tree_tag).next().is_some();
        if has_category_container {
            return PageClass::Category;
        }
        let has_category_heading = document.select(&self.h2).any(|h| {
            let text = element_text(h).to_lowercase();
            text.contains("subcategories") || text.contains("pages in category")
        });
        if has_category_heading {
            return PageClass::Category;
        }

        if let Some(heading) = document.select(&self.first_heading).next() {
            if element_text(heading).trim().starts_with("Category:") {
                return PageClass::Category;
            }
        }

        // A main-content region confirms an article; anything still
        // unclassified defaults to article too.
        let has_content_region = document.select(&self.content_text).next().is_some()
            || document.select(&self.parser_output).next().is_some()
            || document
                .select(&self.paragraphs)
                .any(|p| element_text(p).trim().chars().count() >= 50);
        if !has_content_region {
            tracing::debug!(url, "No content region found, defaulting to article");
        }
        PageClass::Article
    }
}

impl Default for PageClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// First-heading text, falling back to the last URL path segment with
/// underscores turned into spaces.
pub fn page_title(body: &str, url: &str) -> String {
    let document = Html::parse_document(body);
    let selector = Selector::parse("h1#firstHeading").expect("static selector");
    if let Some(heading) = document.select(&selector).next() {
        let text = element_text(heading).trim().to_string();
        if !text.is_empty() {
            return text;
        }
    }
    if let Ok(parsed) = Url::parse(url) {
        if let Some(segment) = parsed.path_segments().and_then(|mut s| s.next_back()) {
            if !segment.is_empty() {
                return segment.replace('_', " ");
            }
        }
    }
    "Untitled".to_string()
}

pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}
