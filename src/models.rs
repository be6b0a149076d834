//! Core data model shared across the crawler components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of wiki page a URL points at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UrlKind {
    Category,
    Article,
}

impl UrlKind {
    /// Queue priority for this kind. Lower is served first, so categories
    /// drain ahead of articles.
    pub fn priority(self) -> u8 {
        match self {
            UrlKind::Category => 1,
            UrlKind::Article => 2,
        }
    }

    /// Infer the kind from a URL path. `/wiki/Category:` pages are
    /// categories, everything else defaults to article.
    pub fn from_url(url: &str) -> Self {
        if url.contains("/Category:") {
            UrlKind::Category
        } else {
            UrlKind::Article
        }
    }
}

/// Lifecycle of a URL as the orchestrator sees it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Pending,
    Processing,
    Completed,
    Filtered,
    Error,
}

impl ProcessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Pending => "pending",
            ProcessStatus::Processing => "processing",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Filtered => "filtered",
            ProcessStatus::Error => "error",
        }
    }
}

/// A discovered URL waiting in the frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlItem {
    pub url: String,
    pub url_type: UrlKind,
    pub priority: u8,
    pub depth: u32,
    pub discovered_at: DateTime<Utc>,
}

impl UrlItem {
    pub fn new(url: impl Into<String>, url_type: UrlKind, depth: u32) -> Self {
        Self {
            url: url.into(),
            url_type,
            priority: url_type.priority(),
            depth,
            discovered_at: Utc::now(),
        }
    }
}

/// Persisted record for a processed category page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub url: String,
    pub title: String,
    pub subcategories: Vec<String>,
    pub articles: Vec<String>,
    pub processed_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: String,
}

impl CategoryRecord {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        subcategories: Vec<String>,
        articles: Vec<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            subcategories,
            articles,
            processed_at: Utc::now(),
            record_type: "category".into(),
        }
    }
}

/// Persisted record for a processed article page. `content` is the cleaned
/// Markdown rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    pub language: String,
    pub processed_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: String,
}

impl ArticleRecord {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            language: language.into(),
            processed_at: Utc::now(),
            record_type: "article".into(),
        }
    }
}

/// Snapshot of the crawl counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlStatus {
    pub is_running: bool,
    pub total_processed: u64,
    pub pending_urls: u64,
    pub categories_processed: u64,
    pub articles_processed: u64,
    pub filtered_count: u64,
    pub error_count: u64,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl CrawlStatus {
    pub fn new(is_running: bool) -> Self {
        let now = Utc::now();
        Self {
            is_running,
            total_processed: 0,
            pending_urls: 0,
            categories_processed: 0,
            articles_processed: 0,
            filtered_count: 0,
            error_count: 0,
            start_time: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// One-line human readable summary of the counters.
    pub fn summary(&self) -> String {
        if !self.is_running && self.total_processed == 0 {
            return "Not started".into();
        }
        let mut parts = vec![
            format!("Processed: {}", self.total_processed),
            format!("Categories: {}", self.categories_processed),
            format!("Articles: {}", self.articles_processed),
            format!("Filtered: {}", self.filtered_count),
            format!("Errors: {}", self.error_count),
            format!("Pending: {}", self.pending_urls),
        ];
        if self.total_processed > 0 {
            let ok = self.categories_processed + self.articles_processed;
            let rate = ok as f64 / self.total_processed as f64 * 100.0;
            parts.push(format!("Success: {rate:.1}%"));
        }
        parts.join(" | ")
    }
}

impl Default for CrawlStatus {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Detailed progress report handed to status displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub status: CrawlStatus,
    pub recent_urls: Vec<String>,
    pub language_stats: std::collections::BTreeMap<String, u64>,
    pub error_summary: std::collections::BTreeMap<String, u64>,
}
