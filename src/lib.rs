//! Resumable breadth-first crawler for a single wiki-style site.
//!
//! From a seed category URL it walks the category tree to a bounded depth,
//! writing every reachable article as a cleaned Markdown JSON document and
//! every category as a metadata record. All state is checkpointed so an
//! interrupted crawl resumes where it stopped.

pub mod config;
pub mod crawler;
pub mod fetch;
pub mod models;
pub mod pages;
pub mod progress;
pub mod queue;
pub mod storage;

// Re-export commonly used types for convenience.
pub use config::{CrawlerConfig, FolderOrganization, OrganizeBy};
pub use crawler::Crawler;
pub use models::{ArticleRecord, CategoryRecord, CrawlStatus, ProcessStatus, UrlItem, UrlKind};
pub use queue::{CanonicalOptions, DedupRegistry, UrlFrontier};
pub use storage::FileStore;
