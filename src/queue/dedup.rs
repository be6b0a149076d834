//! Registry of canonical URLs already committed for processing.
//!
//! Entries are never removed in normal operation; the set outlives any one
//! session and is what makes a resumed crawl idempotent.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::canonical::CanonicalOptions;
use crate::storage::write_json_atomic;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupStats {
    pub urls_processed: u64,
    pub duplicates_prevented: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct DedupInner {
    processed: HashSet<String>,
    stats: DedupStats,
    options: CanonicalOptions,
}

/// Authoritative processed-URL set with canonicalization and persistence.
pub struct DedupRegistry {
    state_file: PathBuf,
    inner: Mutex<DedupInner>,
}

impl DedupRegistry {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
            inner: Mutex::new(DedupInner {
                processed: HashSet::new(),
                stats: DedupStats::default(),
                options: CanonicalOptions::default(),
            }),
        }
    }

    pub fn with_options(state_file: impl Into<PathBuf>, options: CanonicalOptions) -> Self {
        let registry = Self::new(state_file);
        registry.inner.lock().expect("dedup lock poisoned").options = options;
        registry
    }

    /// Whether the URL's canonical form has already been committed.
    pub fn is_processed(&self, url: &str) -> bool {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        let canonical = inner.options.canonicalize(url);
        let hit = inner.processed.contains(&canonical);
        if hit {
            inner.stats.duplicates_prevented += 1;
            debug!(url = %canonical, "Duplicate URL detected");
        }
        hit
    }

    /// Commit a URL. Returns true iff it was newly marked.
    pub fn mark_processed(&self, url: &str) -> bool {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        let canonical = inner.options.canonicalize(url);
        if inner.processed.contains(&canonical) {
            inner.stats.duplicates_prevented += 1;
            return false;
        }
        inner.processed.insert(canonical);
        inner.stats.urls_processed += 1;
        inner.stats.last_updated = Some(Utc::now());
        true
    }

    /// Commit many URLs; returns how many were new.
    pub fn batch_mark(&self, urls: &[String]) -> usize {
        let newly = urls.iter().filter(|url| self.mark_processed(url)).count();
        info!(added = newly, total = urls.len(), "Batch-marked URLs as processed");
        newly
    }

    pub fn processed_count(&self) -> usize {
        self.inner.lock().expect("dedup lock poisoned").processed.len()
    }

    pub fn stats(&self) -> DedupStats {
        self.inner.lock().expect("dedup lock poisoned").stats.clone()
    }

    pub fn processed_urls(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("dedup lock poisoned");
        inner.processed.iter().cloned().collect()
    }

    pub fn options(&self) -> CanonicalOptions {
        self.inner.lock().expect("dedup lock poisoned").options
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        inner.processed.clear();
        inner.stats = DedupStats::default();
        info!("Dedup registry cleared");
    }

    /// Persist the processed set, stats, and canonicalization settings.
    pub fn save(&self) -> Result<()> {
        let inner = self.inner.lock().expect("dedup lock poisoned");
        let state = json!({
            "processed_urls": inner.processed.iter().collect::<Vec<_>>(),
            "stats": &inner.stats,
            "settings": inner.options,
            "saved_at": Utc::now(),
        });
        write_json_atomic(&self.state_file, &state).with_context(|| {
            format!("Failed to save dedup state to {}", self.state_file.display())
        })?;
        info!(
            path = %self.state_file.display(),
            urls = inner.processed.len(),
            "Deduplication state saved"
        );
        Ok(())
    }

    /// Restore the processed set from disk. Returns false when no file exists.
    pub fn load(&self) -> Result<bool> {
        if !self.state_file.exists() {
            info!(path = %self.state_file.display(), "No dedup state file, starting fresh");
            return Ok(false);
        }
        let data = std::fs::read_to_string(&self.state_file)
            .with_context(|| format!("Unable to read {}", self.state_file.display()))?;
        let state: DedupState = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse dedup state {}", self.state_file.display()))?;
        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        inner.processed = state.processed_urls.into_iter().collect();
        inner.stats = state.stats;
        if let Some(settings) = state.settings {
            inner.options = settings;
        }
        info!(urls = inner.processed.len(), "Deduplication state loaded");
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct DedupState {
    #[serde(default)]
    processed_urls: Vec<String>,
    #[serde(default)]
    stats: DedupStats,
    #[serde(default)]
    settings: Option<CanonicalOptions>,
}
