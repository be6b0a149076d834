//! Category page handling: link harvesting, the depth gate, and category
//! record persistence.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use super::element_text;
use crate::models::{CategoryRecord, UrlKind};
use crate::storage::FileStore;

/// Namespace prefixes that mark non-article pages.
const SPECIAL_PREFIXES: &[&str] = &[
    "/Special:",
    "/Help:",
    "/Template:",
    "/User:",
    "/Talk:",
    "/File:",
    "/Media:",
    "/Wikipedia:",
    "/Portal:",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryStats {
    pub categories_processed: u64,
    pub subcategories_found: u64,
    pub articles_found: u64,
    pub invalid_urls_filtered: u64,
    pub depth_limited: u64,
}

/// Everything a processed category page yields.
#[derive(Debug)]
pub struct CategoryOutcome {
    pub title: String,
    pub subcategories: Vec<String>,
    pub articles: Vec<String>,
    /// URLs to feed back into the frontier, with their kind and depth.
    pub discovered: Vec<(String, UrlKind, u32)>,
    pub saved_path: PathBuf,
}

/// Extracts subcategory and article links from category pages and persists
/// the category record.
pub struct CategoryHandler {
    store: Arc<FileStore>,
    max_depth: u32,
    stats: Mutex<CategoryStats>,
    first_heading: Selector,
    subcategories_links: Selector,
    tree_links: Selector,
    h2: Selector,
    content_links: Selector,
    pages_links: Selector,
    media_links: Selector,
    content_lists: Selector,
    anchors: Selector,
}

impl CategoryHandler {
    pub fn new(store: Arc<FileStore>, max_depth: u32) -> Self {
        Self {
            store,
            max_depth,
            stats: Mutex::new(CategoryStats::default()),
            first_heading: Selector::parse("h1#firstHeading").expect("static selector"),
            subcategories_links: Selector::parse("div#mw-subcategories a[href]")
                .expect("static selector"),
            tree_links: Selector::parse(".CategoryTreeTag a[href]").expect("static selector"),
            h2: Selector::parse("h2").expect("static selector"),
            content_links: Selector::parse("div#mw-content-text a[href]").expect("static selector"),
            pages_links: Selector::parse("div#mw-pages a[href]").expect("static selector"),
            media_links: Selector::parse("div#mw-category-media a[href]").expect("static selector"),
            content_lists: Selector::parse("div#mw-content-text ul, div#mw-content-text ol")
                .expect("static selector"),
            anchors: Selector::parse("a[href]").expect("static selector"),
        }
    }

    /// Process one category page at the given depth. The record is persisted
    /// before the outcome is returned; a storage failure fails the call.
    pub fn process(&self, url: &str, body: &str, depth: u32) -> Result<CategoryOutcome> {
        info!(url, depth, "Processing category page");
        let document = Html::parse_document(body);
        let base = Url::parse(url).with_context(|| format!("Invalid category URL {url}"))?;

        let title = self.extract_title(&document, &base);
        let subcategories = self.extract_subcategories(&document, &base);
        let articles = self.extract_articles(&document, &base);

        {
            let mut stats = self.stats.lock().expect("category stats lock poisoned");
            stats.categories_processed += 1;
            stats.subcategories_found += subcategories.len() as u64;
            stats.articles_found += articles.len() as u64;
        }

        let record = CategoryRecord::new(url, &title, subcategories.clone(), articles.clone());
        let saved_path = self
            .store
            .save_category(&record)
            .with_context(|| format!("Failed to save category record for {url}"))?;

        let mut discovered = Vec::new();
        if depth < self.max_depth {
            for subcategory in &subcategories {
                discovered.push((subcategory.clone(), UrlKind::Category, depth + 1));
            }
        } else if !subcategories.is_empty() {
            let mut stats = self.stats.lock().expect("category stats lock poisoned");
            stats.depth_limited += subcategories.len() as u64;
            info!(
                url,
                max_depth = self.max_depth,
                dropped = subcategories.len(),
                "Max depth reached, skipping subcategories"
            );
        }
        for article in &articles {
            discovered.push((article.clone(), UrlKind::Article, depth));
        }

        info!(
            title = %title,
            subcategories = subcategories.len(),
            articles = articles.len(),
            "Processed category"
        );
        Ok(CategoryOutcome {
            title,
            subcategories,
            articles,
            discovered,
            saved_path,
        })
    }

    pub fn stats(&self) -> CategoryStats {
        self.stats.lock().expect("category stats lock poisoned").clone()
    }

    fn extract_title(&self, document: &Html, base: &Url) -> String {
        if let Some(heading) = document.select(&self.first_heading).next() {
            let text = element_text(heading).trim().to_string();
            if !text.is_empty() {
                return text.strip_prefix("Category:").unwrap_or(&text).trim().to_string();
            }
        }
        if let Some((_, tail)) = base.path().split_once("/Category:") {
            return tail.replace('_', " ");
        }
        "Unknown Category".to_string()
    }

    fn extract_subcategories(&self, document: &Html, base: &Url) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut push = |url: String| {
            if seen.insert(url.clone()) {
                found.push(url);
            }
        };

        for link in document.select(&self.subcategories_links) {
            self.collect_category_link(link, base, &mut push);
        }
        for link in document.select(&self.tree_links) {
            self.collect_category_link(link, base, &mut push);
        }
        for region in self.heading_regions(document, "subcategories") {
            for link in region.select(&self.anchors) {
                self.collect_category_link(link, base, &mut push);
            }
        }
        // Permissive sweep: category links in the main content whose visible
        // text actually talks about categories.
        for link in document.select(&self.content_links) {
            let href = link.value().attr("href").unwrap_or_default();
            if !href.contains("/Category:") {
                continue;
            }
            let text = element_text(link).to_lowercase();
            if text.contains("category") || text.contains("categories") {
                self.collect_category_link(link, base, &mut push);
            }
        }

        debug!(count = found.len(), "Extracted subcategories");
        found
    }

    fn extract_articles(&self, document: &Html, base: &Url) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut push = |url: String| {
            if seen.insert(url.clone()) {
                found.push(url);
            }
        };

        for link in document.select(&self.pages_links) {
            self.collect_article_link(link, base, &mut push);
        }
        for region in self.heading_regions(document, "pages in category") {
            for link in region.select(&self.anchors) {
                self.collect_article_link(link, base, &mut push);
            }
        }
        for list in document.select(&self.content_lists) {
            if in_navigation(list) {
                continue;
            }
            for link in list.select(&self.anchors) {
                self.collect_article_link(link, base, &mut push);
            }
        }
        for link in document.select(&self.media_links) {
            self.collect_article_link(link, base, &mut push);
        }

        debug!(count = found.len(), "Extracted articles");
        found
    }

    fn collect_category_link(
        &self,
        link: ElementRef<'_>,
        base: &Url,
        push: &mut impl FnMut(String),
    ) {
        let href = link.value().attr("href").unwrap_or_default();
        if !href.contains("/Category:") {
            return;
        }
        match resolve_and_validate(href, base) {
            Some(url) => push(url),
            None => self.count_invalid(),
        }
    }

    fn collect_article_link(
        &self,
        link: ElementRef<'_>,
        base: &Url,
        push: &mut impl FnMut(String),
    ) {
        let href = link.value().attr("href").unwrap_or_default();
        if !is_article_link(href) {
            return;
        }
        match resolve_and_validate(href, base) {
            Some(url) => push(url),
            None => self.count_invalid(),
        }
    }

    fn count_invalid(&self) {
        self.stats
            .lock()
            .expect("category stats lock poisoned")
            .invalid_urls_filtered += 1;
    }

    /// The first div/ul sibling after each h2 whose text contains `needle`.
    fn heading_regions<'a>(&self, document: &'a Html, needle: &str) -> Vec<ElementRef<'a>> {
        let mut regions = Vec::new();
        for heading in document.select(&self.h2) {
            if !element_text(heading).to_lowercase().contains(needle) {
                continue;
            }
            for sibling in heading.next_siblings() {
                if let Some(element) = ElementRef::wrap(sibling) {
                    let name = element.value().name();
                    if name == "div" || name == "ul" {
                        regions.push(element);
                    }
                    break;
                }
            }
        }
        regions
    }
}

/// Whether an href points at an article rather than a namespace page,
/// fragment, or external site.
fn is_article_link(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }
    if href.contains("/Category:") {
        return false;
    }
    if SPECIAL_PREFIXES.iter().any(|prefix| href.contains(prefix)) {
        return false;
    }
    if href.starts_with("http") && !href.contains("wikipedia.org") {
        return false;
    }
    href.starts_with("/wiki/") || href.contains("wikipedia.org/wiki/")
}

/// Resolve an href against the page URL and keep it only when it is an
/// HTTPS wikipedia.org /wiki/ page.
fn resolve_and_validate(href: &str, base: &Url) -> Option<String> {
    let absolute = if href.starts_with("http") {
        Url::parse(href).ok()?
    } else {
        base.join(href).ok()?
    };
    if absolute.scheme() != "https" {
        return None;
    }
    let host = absolute.host_str()?;
    if !host.ends_with("wikipedia.org") {
        return None;
    }
    if !absolute.path().starts_with("/wiki/") {
        return None;
    }
    Some(absolute.to_string())
}

/// Lists inside navigation chrome are skipped by the article sweep.
fn in_navigation(list: ElementRef<'_>) -> bool {
    for ancestor in list.ancestors() {
        if let Some(element) = ancestor.value().as_element() {
            if element.name() == "nav" {
                return true;
            }
            let class = element.attr("class").unwrap_or_default().to_lowercase();
            if class.contains("nav") || class.contains("menu") || class.contains("toc") {
                return true;
            }
        }
    }
    false
}
