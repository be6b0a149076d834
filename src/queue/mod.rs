//! URL frontier: the priority queue of discovered-but-unprocessed URLs.
//!
//! Categories are served before articles, and within a priority class URLs
//! come out in insertion order. The frontier keeps its own pending/completed
//! sets for fast in-queue dedup; the [`DedupRegistry`] is the authoritative
//! cross-session record.

pub mod canonical;
pub mod dedup;

pub use canonical::CanonicalOptions;
pub use dedup::DedupRegistry;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::models::{UrlItem, UrlKind};
use crate::storage::write_json_atomic;

/// Counters the frontier tracks across its lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontierStats {
    pub urls_added: u64,
    pub urls_completed: u64,
    pub categories_pending: u64,
    pub articles_pending: u64,
}

/// Heap entry ordered by `(priority asc, insertion seq asc)`.
#[derive(Debug)]
struct HeapEntry {
    priority: u8,
    seq: u64,
    item: UrlItem,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the maximum, so invert: the smallest
        // (priority, seq) pair must compare greatest.
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct FrontierInner {
    heap: BinaryHeap<HeapEntry>,
    pending: HashSet<String>,
    completed: HashSet<String>,
    stats: FrontierStats,
    next_seq: u64,
}

/// Thread-safe priority frontier with JSON persistence.
pub struct UrlFrontier {
    state_file: PathBuf,
    canonical: CanonicalOptions,
    inner: Mutex<FrontierInner>,
}

impl UrlFrontier {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
            canonical: CanonicalOptions::default(),
            inner: Mutex::new(FrontierInner::default()),
        }
    }

    /// Queue a URL unless its canonical form is already pending or completed.
    /// Returns whether the URL was actually enqueued.
    pub fn add(&self, url: &str, url_type: UrlKind, depth: u32) -> bool {
        let canonical = self.canonical.canonicalize(url);
        let mut inner = self.inner.lock().expect("frontier lock poisoned");
        if inner.pending.contains(&canonical) || inner.completed.contains(&canonical) {
            debug!(url = %canonical, "URL already pending or completed, not enqueued");
            return false;
        }
        let item = UrlItem::new(canonical.clone(), url_type, depth);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(HeapEntry {
            priority: item.priority,
            seq,
            item,
        });
        inner.pending.insert(canonical.clone());
        inner.stats.urls_added += 1;
        match url_type {
            UrlKind::Category => inner.stats.categories_pending += 1,
            UrlKind::Article => inner.stats.articles_pending += 1,
        }
        debug!(url = %canonical, ?url_type, depth, "Enqueued URL");
        true
    }

    /// Pop the lowest-priority entry, removing it from the pending set.
    pub fn next(&self) -> Option<UrlItem> {
        let mut inner = self.inner.lock().expect("frontier lock poisoned");
        let entry = inner.heap.pop()?;
        inner.pending.remove(&entry.item.url);
        match entry.item.url_type {
            UrlKind::Category => {
                inner.stats.categories_pending = inner.stats.categories_pending.saturating_sub(1)
            }
            UrlKind::Article => {
                inner.stats.articles_pending = inner.stats.articles_pending.saturating_sub(1)
            }
        }
        Some(entry.item)
    }

    /// Record a URL as done so it can never re-enter the queue.
    pub fn mark_completed(&self, url: &str) {
        let canonical = self.canonical.canonicalize(url);
        let mut inner = self.inner.lock().expect("frontier lock poisoned");
        inner.pending.remove(&canonical);
        inner.completed.insert(canonical);
        inner.stats.urls_completed += 1;
    }

    pub fn size(&self) -> usize {
        self.inner.lock().expect("frontier lock poisoned").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn stats(&self) -> FrontierStats {
        self.inner.lock().expect("frontier lock poisoned").stats.clone()
    }

    pub fn pending_urls(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("frontier lock poisoned");
        inner.pending.iter().cloned().collect()
    }

    pub fn completed_urls(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("frontier lock poisoned");
        inner.completed.iter().cloned().collect()
    }

    /// Drop everything, counters included.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("frontier lock poisoned");
        *inner = FrontierInner::default();
        info!("Frontier cleared");
    }

    /// Persist pending entries, completed set, and stats to the state file.
    pub fn save(&self) -> Result<()> {
        let inner = self.inner.lock().expect("frontier lock poisoned");
        // Serialize in service order so a reload replays identically.
        let mut entries: Vec<&HeapEntry> = inner.heap.iter().collect();
        entries.sort_by_key(|e| (e.priority, e.seq));
        let queue_items: Vec<serde_json::Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "priority": entry.priority,
                    "url": &entry.item.url,
                    "url_item": &entry.item,
                })
            })
            .collect();
        let state = json!({
            "queue_items": queue_items,
            "pending_urls": inner.pending.iter().collect::<Vec<_>>(),
            "completed_urls": inner.completed.iter().collect::<Vec<_>>(),
            "stats": &inner.stats,
            "saved_at": Utc::now(),
        });
        write_json_atomic(&self.state_file, &state)
            .with_context(|| format!("Failed to save queue state to {}", self.state_file.display()))?;
        info!(path = %self.state_file.display(), pending = inner.heap.len(), "Queue state saved");
        Ok(())
    }

    /// Restore state from the state file. Returns false when no file exists.
    pub fn load(&self) -> Result<bool> {
        if !self.state_file.exists() {
            info!(path = %self.state_file.display(), "No queue state file, starting fresh");
            return Ok(false);
        }
        let data = std::fs::read_to_string(&self.state_file)
            .with_context(|| format!("Unable to read {}", self.state_file.display()))?;
        let state: QueueState = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse queue state {}", self.state_file.display()))?;

        let mut inner = self.inner.lock().expect("frontier lock poisoned");
        *inner = FrontierInner::default();
        for wrapper in state.queue_items {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(HeapEntry {
                priority: wrapper.url_item.priority,
                seq,
                item: wrapper.url_item,
            });
        }
        inner.pending = state.pending_urls.into_iter().collect();
        inner.completed = state.completed_urls.into_iter().collect();
        inner.stats = state.stats;
        info!(
            pending = inner.heap.len(),
            completed = inner.completed.len(),
            "Queue state loaded"
        );
        Ok(true)
    }
}

/// On-disk form of the frontier state.
#[derive(Debug, Deserialize)]
struct QueueState {
    #[serde(default)]
    queue_items: Vec<QueueItemWrapper>,
    #[serde(default)]
    pending_urls: Vec<String>,
    #[serde(default)]
    completed_urls: Vec<String>,
    #[serde(default)]
    stats: FrontierStats,
}

#[derive(Debug, Deserialize)]
struct QueueItemWrapper {
    url_item: UrlItem,
}
