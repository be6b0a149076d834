//! Progress tracking and the `progress_state.json` persistence behind it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::models::{CrawlStatus, ProcessStatus, ProgressReport, UrlKind};
use crate::storage::write_json_atomic;

const STATE_FORMAT_VERSION: &str = "1.0";
const DEFAULT_MAX_RECENT: usize = 100;

/// Map an error message onto the closed category set used by the error
/// histogram. First match wins.
pub fn categorize_error(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("connection") {
        "network_error"
    } else if lower.contains("not found") || lower.contains("404") {
        "page_not_found"
    } else if lower.contains("permission") || lower.contains("forbidden") {
        "access_denied"
    } else if lower.contains("content") || lower.contains("processing") {
        "content_processing_error"
    } else if lower.contains("save") || lower.contains("storage") {
        "storage_error"
    } else {
        "other_error"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerStats {
    pub total_updates: u64,
    pub state_saves: u64,
    pub state_loads: u64,
}

#[derive(Debug, Default)]
struct ProgressInner {
    status: CrawlStatus,
    recent: VecDeque<String>,
    language_stats: BTreeMap<String, u64>,
    error_summary: BTreeMap<String, u64>,
    url_status: HashMap<String, ProcessStatus>,
    url_types: HashMap<String, UrlKind>,
    url_timestamps: HashMap<String, DateTime<Utc>>,
    stats: TrackerStats,
}

/// Counters, histograms, and the recent-activity ring, behind one lock.
pub struct ProgressTracker {
    state_file: PathBuf,
    max_recent: usize,
    inner: Mutex<ProgressInner>,
}

impl ProgressTracker {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
            max_recent: DEFAULT_MAX_RECENT,
            inner: Mutex::new(ProgressInner::default()),
        }
    }

    /// Mark the start of a crawling session.
    pub fn start_crawling(&self, start_url: &str) {
        let mut inner = self.inner.lock().expect("progress lock poisoned");
        inner.status = CrawlStatus::new(true);
        inner.recent.clear();
        inner.recent.push_back(format!("Started crawling from: {start_url}"));
        info!(start_url, "Started crawling session");
    }

    /// Mark the end of a crawling session.
    pub fn stop_crawling(&self) {
        let mut inner = self.inner.lock().expect("progress lock poisoned");
        inner.status.is_running = false;
        inner.status.touch();
        let line = format!("Stopped crawling at: {}", Utc::now().to_rfc3339());
        push_recent(&mut inner.recent, line, self.max_recent);
        info!("Stopped crawling session");
    }

    /// Record the outcome of one URL.
    pub fn update(
        &self,
        url: &str,
        status: ProcessStatus,
        url_type: Option<UrlKind>,
        language: Option<&str>,
        error_message: Option<&str>,
    ) {
        let mut inner = self.inner.lock().expect("progress lock poisoned");
        let now = Utc::now();

        inner.url_status.insert(url.to_string(), status);
        inner.url_timestamps.insert(url.to_string(), now);
        if let Some(kind) = url_type {
            inner.url_types.insert(url.to_string(), kind);
        }

        let mut tag = status.as_str().to_uppercase();
        if let Some(language) = language {
            tag.push_str(&format!(" ({language})"));
        }
        if let Some(message) = error_message {
            let head: String = message.chars().take(50).collect();
            tag.push_str(&format!(" - {head}..."));
        }
        let line = format!("{} {}: {}", now.format("%H:%M:%S"), tag, url);
        push_recent(&mut inner.recent, line, self.max_recent);

        inner.status.total_processed += 1;
        inner.status.touch();

        match status {
            ProcessStatus::Completed => {
                match url_type {
                    Some(UrlKind::Category) => inner.status.categories_processed += 1,
                    Some(UrlKind::Article) => inner.status.articles_processed += 1,
                    None => {}
                }
                if let (Some(language), Some(UrlKind::Article)) = (language, url_type) {
                    *inner.language_stats.entry(language.to_string()).or_default() += 1;
                }
            }
            ProcessStatus::Filtered => {
                inner.status.filtered_count += 1;
                if let Some(language) = language {
                    *inner.language_stats.entry(language.to_string()).or_default() += 1;
                }
            }
            ProcessStatus::Error => {
                inner.status.error_count += 1;
                if let Some(message) = error_message {
                    let category = categorize_error(message);
                    *inner.error_summary.entry(category.to_string()).or_default() += 1;
                }
            }
            ProcessStatus::Pending | ProcessStatus::Processing => {}
        }

        inner.stats.total_updates += 1;
        debug!(url, status = status.as_str(), "Updated progress");
    }

    /// Push the current frontier size in after each dequeue.
    pub fn set_pending(&self, pending: u64) {
        let mut inner = self.inner.lock().expect("progress lock poisoned");
        inner.status.pending_urls = pending;
        inner.status.touch();
    }

    pub fn status(&self) -> CrawlStatus {
        self.inner.lock().expect("progress lock poisoned").status.clone()
    }

    pub fn report(&self) -> ProgressReport {
        let inner = self.inner.lock().expect("progress lock poisoned");
        ProgressReport {
            status: inner.status.clone(),
            recent_urls: inner.recent.iter().cloned().collect(),
            language_stats: inner.language_stats.clone(),
            error_summary: inner.error_summary.clone(),
        }
    }

    pub fn url_status(&self, url: &str) -> Option<ProcessStatus> {
        self.inner
            .lock()
            .expect("progress lock poisoned")
            .url_status
            .get(url)
            .copied()
    }

    pub fn urls_with_status(&self, status: ProcessStatus) -> Vec<String> {
        let inner = self.inner.lock().expect("progress lock poisoned");
        inner
            .url_status
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn stats(&self) -> TrackerStats {
        self.inner.lock().expect("progress lock poisoned").stats.clone()
    }

    /// Persist the full tracker state atomically.
    pub fn save(&self) -> Result<()> {
        let state = {
            let inner = self.inner.lock().expect("progress lock poisoned");
            json!({
                "status": &inner.status,
                "recent_urls": inner.recent.iter().collect::<Vec<_>>(),
                "language_stats": &inner.language_stats,
                "error_summary": &inner.error_summary,
                "url_status": &inner.url_status,
                "url_types": &inner.url_types,
                "url_timestamps": &inner.url_timestamps,
                "stats": &inner.stats,
                "saved_at": Utc::now(),
                "version": STATE_FORMAT_VERSION,
            })
        };
        write_json_atomic(&self.state_file, &state).with_context(|| {
            format!("Failed to save progress state to {}", self.state_file.display())
        })?;
        let mut inner = self.inner.lock().expect("progress lock poisoned");
        inner.stats.state_saves += 1;
        info!(path = %self.state_file.display(), "Saved progress state");
        Ok(())
    }

    /// Restore tracker state from disk. A corrupt file is reported, the
    /// state is left empty, and the crawl continues.
    pub fn load(&self) -> bool {
        if !self.state_file.exists() {
            info!(path = %self.state_file.display(), "No progress state file, starting fresh");
            return false;
        }
        let data = match std::fs::read_to_string(&self.state_file) {
            Ok(data) => data,
            Err(err) => {
                error!(path = %self.state_file.display(), %err, "Failed to read progress state");
                return false;
            }
        };
        let state: ProgressState = match serde_json::from_str(&data) {
            Ok(state) => state,
            Err(err) => {
                error!(path = %self.state_file.display(), %err, "Failed to parse progress state");
                return false;
            }
        };

        let mut inner = self.inner.lock().expect("progress lock poisoned");
        inner.status = state.status;
        inner.recent = state.recent_urls.into_iter().collect();
        inner.language_stats = state.language_stats;
        inner.error_summary = state.error_summary;
        inner.url_status = state.url_status;
        inner.url_types = state.url_types;
        inner.url_timestamps = state.url_timestamps;
        inner.stats = state.stats;
        inner.stats.state_loads += 1;
        info!(path = %self.state_file.display(), "Loaded progress state");
        true
    }
}

fn push_recent(ring: &mut VecDeque<String>, line: String, cap: usize) {
    ring.push_back(line);
    while ring.len() > cap {
        ring.pop_front();
    }
}

#[derive(Debug, Deserialize)]
struct ProgressState {
    #[serde(default)]
    status: CrawlStatus,
    #[serde(default)]
    recent_urls: Vec<String>,
    #[serde(default)]
    language_stats: BTreeMap<String, u64>,
    #[serde(default)]
    error_summary: BTreeMap<String, u64>,
    #[serde(default)]
    url_status: HashMap<String, ProcessStatus>,
    #[serde(default)]
    url_types: HashMap<String, UrlKind>,
    #[serde(default)]
    url_timestamps: HashMap<String, DateTime<Utc>>,
    #[serde(default)]
    stats: TrackerStats,
}
