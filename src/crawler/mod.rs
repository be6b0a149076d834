//! The crawl orchestrator: owns the loop that drains the frontier, routes
//! pages to their handlers, and checkpoints state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::CrawlerConfig;
use crate::fetch::{Fetcher, HttpGateway, OperatorConsole, ReqwestGateway, StdinConsole};
use crate::models::{ArticleRecord, CrawlStatus, ProcessStatus, UrlItem, UrlKind};
use crate::pages::{self, CategoryHandler, ContentPipeline, LanguageFilter, PageClass, PageClassifier};
use crate::progress::{categorize_error, ProgressTracker};
use crate::queue::{DedupRegistry, UrlFrontier};
use crate::storage::FileStore;

/// URLs processed between checkpoints.
const CHECKPOINT_INTERVAL: u64 = 10;
/// Consecutive empty polls before the crawl is considered finished.
const MAX_EMPTY_CHECKS: u32 = 10;
const EMPTY_CHECK_SLEEP: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct SessionStats {
    urls_processed: u64,
    errors: u64,
}

/// Single-worker crawl engine wired from the configured components.
pub struct Crawler {
    config: CrawlerConfig,
    frontier: UrlFrontier,
    dedup: DedupRegistry,
    progress: ProgressTracker,
    store: Arc<FileStore>,
    fetcher: Fetcher,
    classifier: PageClassifier,
    categories: CategoryHandler,
    pipeline: ContentPipeline,
    language: LanguageFilter,
    shutdown: Arc<AtomicBool>,
    resumed_state: bool,
    session: SessionStats,
}

impl Crawler {
    /// Production wiring: blocking HTTP client and the stdin operator dialog.
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let gateway = ReqwestGateway::new()?;
        Self::with_components(config, Box::new(gateway), Box::new(StdinConsole))
    }

    /// Wiring with injected HTTP and operator seams.
    pub fn with_components(
        config: CrawlerConfig,
        gateway: Box<dyn HttpGateway>,
        console: Box<dyn OperatorConsole>,
    ) -> Result<Self> {
        config.validate().context("Invalid crawler configuration")?;

        let store = Arc::new(FileStore::new(
            &config.output_dir,
            &config.folder_organization,
            config.category_folder_name(),
            config.max_filename_length,
        )?);

        let state_dir = config.output_dir.join("state");
        let shutdown = Arc::new(AtomicBool::new(false));
        let fetcher = Fetcher::new(
            gateway,
            console,
            config.request_delay,
            config.max_retries,
            config.request_timeout,
            Arc::clone(&shutdown),
        );
        let categories = CategoryHandler::new(Arc::clone(&store), config.max_depth);
        let pipeline = ContentPipeline::new(config.min_content_length);
        let language = LanguageFilter::new(&config.supported_languages);

        info!(
            start_url = %config.start_url,
            output_dir = %config.output_dir.display(),
            max_depth = config.max_depth,
            "Crawler initialized"
        );

        Ok(Self {
            frontier: UrlFrontier::new(state_dir.join("queue_state.json")),
            dedup: DedupRegistry::new(state_dir.join("deduplication_state.json")),
            progress: ProgressTracker::new(state_dir.join("progress_state.json")),
            store,
            fetcher,
            classifier: PageClassifier::new(),
            categories,
            pipeline,
            language,
            shutdown,
            resumed_state: false,
            session: SessionStats::default(),
            config,
        })
    }

    /// Flag observed at the top of every loop iteration and between
    /// retries; hand this to a signal handler.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether any on-disk state survived into this run.
    pub fn resumed_state(&self) -> bool {
        self.resumed_state
    }

    /// Drive the crawl to completion (or shutdown). Storage failures abort;
    /// everything else is a per-URL outcome.
    pub fn run(&mut self) -> Result<CrawlStatus> {
        self.store.cleanup_temp_files();
        self.load_state();
        self.seed_if_needed();
        self.progress.start_crawling(&self.config.start_url);

        let mut empty_checks = 0u32;
        let mut processed_any = false;
        let outcome = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, finishing crawl loop");
                break Ok(());
            }

            let Some(item) = self.frontier.next() else {
                empty_checks += 1;
                if empty_checks >= MAX_EMPTY_CHECKS && (processed_any || self.resumed_state) {
                    info!("No more URLs to process, finishing crawl");
                    break Ok(());
                }
                debug!(check = empty_checks, max = MAX_EMPTY_CHECKS, "Queue empty, waiting");
                std::thread::sleep(EMPTY_CHECK_SLEEP);
                continue;
            };
            empty_checks = 0;
            processed_any = true;

            // Belt and braces: the registry may already know this URL from a
            // previous session even though the frontier did not.
            if self.dedup.is_processed(&item.url) {
                debug!(url = %item.url, "URL already processed, skipping");
                continue;
            }
            self.dedup.mark_processed(&item.url);
            self.frontier.mark_completed(&item.url);

            if let Err(err) = self.process_url(&item) {
                error!(url = %item.url, "Fatal failure, stopping crawl: {err:#}");
                break Err(err);
            }

            self.progress.set_pending(self.frontier.size() as u64);
            self.session.urls_processed += 1;
            if self.session.urls_processed % CHECKPOINT_INTERVAL == 0 {
                self.checkpoint();
            }
        };

        self.progress.stop_crawling();
        self.checkpoint();
        match outcome {
            Ok(()) => {
                let mut status = self.progress.status();
                status.pending_urls = self.frontier.size() as u64;
                info!(summary = %status.summary(), "Crawl finished");
                Ok(status)
            }
            Err(err) => Err(err),
        }
    }

    /// Current status with a live pending count.
    pub fn status(&self) -> CrawlStatus {
        let mut status = self.progress.status();
        status.pending_urls = self.frontier.size() as u64;
        status
    }

    /// Aggregated statistics from every component.
    pub fn detailed_stats(&self) -> serde_json::Value {
        json!({
            "crawler": {
                "shutdown_requested": self.shutdown.load(Ordering::SeqCst),
                "resumed_state": self.resumed_state,
                "session": {
                    "urls_processed": self.session.urls_processed,
                    "errors": self.session.errors,
                },
            },
            "queue": self.frontier.stats(),
            "deduplication": self.dedup.stats(),
            "progress": self.progress.stats(),
            "fetcher": self.fetcher.stats(),
            "categories": self.categories.stats(),
            "languages": self.language.language_stats(),
            "storage": self.store.storage_stats(),
        })
    }

    /// Final human-readable summary for the console.
    pub fn summary(&self) -> String {
        let status = self.status();
        let report = self.progress.report();
        let storage = self.store.storage_stats();
        let mut lines = vec![
            format!("Crawl summary: {}", status.summary()),
            format!(
                "Output: {} files ({} categories, {} articles), {:.2} MB in {}",
                storage.total_files,
                storage.category_files,
                storage.article_files,
                storage.total_size_bytes as f64 / (1024.0 * 1024.0),
                storage.output_directory.display(),
            ),
        ];
        if !report.language_stats.is_empty() {
            let languages = report
                .language_stats
                .iter()
                .map(|(code, count)| format!("{code}: {count}"))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Languages: {languages}"));
        }
        if !report.error_summary.is_empty() {
            let errors = report
                .error_summary
                .iter()
                .map(|(category, count)| format!("{category}: {count}"))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Errors: {errors}"));
        }
        lines.push(if self.resumed_state {
            "State: resumed from a previous session".to_string()
        } else {
            "State: fresh crawl".to_string()
        });
        lines.join("\n")
    }

    fn load_state(&mut self) {
        info!("Loading crawler state");
        let queue_loaded = match self.frontier.load() {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("Failed to load queue state, starting with an empty queue: {err:#}");
                false
            }
        };
        let dedup_loaded = match self.dedup.load() {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("Failed to load dedup state, starting with an empty registry: {err:#}");
                false
            }
        };
        let progress_loaded = self.progress.load();
        self.resumed_state = queue_loaded || dedup_loaded || progress_loaded;
        if self.resumed_state {
            info!(
                pending = self.frontier.size(),
                processed = self.dedup.processed_count(),
                "Crawler state restored"
            );
        } else {
            info!("No existing state found, starting fresh");
        }
    }

    fn seed_if_needed(&self) {
        if !self.frontier.is_empty() || self.dedup.is_processed(&self.config.start_url) {
            return;
        }
        let kind = UrlKind::from_url(&self.config.start_url);
        info!(url = %self.config.start_url, ?kind, "Seeding frontier");
        self.frontier.add(&self.config.start_url, kind, 0);
    }

    fn process_url(&mut self, item: &UrlItem) -> Result<()> {
        info!(url = %item.url, kind = ?item.url_type, depth = item.depth, "Processing URL");

        let page = match self.fetcher.get(&item.url) {
            Ok(page) => page,
            Err(failure) => {
                warn!(url = %item.url, kind = failure.kind.as_str(), "Fetch failed: {}", failure.message);
                self.progress.update(
                    &item.url,
                    ProcessStatus::Error,
                    Some(item.url_type),
                    None,
                    Some(&failure.message),
                );
                self.session.errors += 1;
                return Ok(());
            }
        };

        match self.classifier.classify(&page.body, &item.url) {
            PageClass::Category => self.handle_category(item, &page.body),
            PageClass::Article => self.handle_article(item, &page.body),
            PageClass::Unknown => {
                warn!(url = %item.url, "Could not classify page");
                self.progress.update(
                    &item.url,
                    ProcessStatus::Error,
                    Some(item.url_type),
                    None,
                    Some("Unknown page type"),
                );
                self.session.errors += 1;
                Ok(())
            }
        }
    }

    fn handle_category(&mut self, item: &UrlItem, body: &str) -> Result<()> {
        match self.categories.process(&item.url, body, item.depth) {
            Ok(outcome) => {
                let mut enqueued = 0usize;
                for (url, kind, depth) in &outcome.discovered {
                    if !self.dedup.is_processed(url) && self.frontier.add(url, *kind, *depth) {
                        enqueued += 1;
                    }
                }
                self.progress.update(
                    &item.url,
                    ProcessStatus::Completed,
                    Some(UrlKind::Category),
                    None,
                    None,
                );
                info!(url = %item.url, title = %outcome.title, enqueued, "Category processed");
                Ok(())
            }
            Err(err) => self.record_or_escalate(item, UrlKind::Category, err),
        }
    }

    fn handle_article(&mut self, item: &UrlItem, body: &str) -> Result<()> {
        let title = pages::page_title(body, &item.url);

        let markdown = match self.pipeline.process(body) {
            Ok(markdown) => markdown,
            Err(err) => {
                let message = format!("Content processing failed: {err:#}");
                warn!(url = %item.url, "{message}");
                self.progress.update(
                    &item.url,
                    ProcessStatus::Error,
                    Some(UrlKind::Article),
                    None,
                    Some(&message),
                );
                self.session.errors += 1;
                return Ok(());
            }
        };

        let (accept, language) = self.language.filter(&markdown, &item.url);
        if !accept {
            info!(url = %item.url, language, "Article filtered by language");
            self.progress.update(
                &item.url,
                ProcessStatus::Filtered,
                Some(UrlKind::Article),
                Some(&language),
                None,
            );
            return Ok(());
        }

        let record = ArticleRecord::new(&item.url, &title, &markdown, &language);
        match self.store.save_article(&record) {
            Ok(_path) => {
                self.progress.update(
                    &item.url,
                    ProcessStatus::Completed,
                    Some(UrlKind::Article),
                    Some(&language),
                    None,
                );
                info!(url = %item.url, title = %title, language, "Article saved");
                Ok(())
            }
            Err(err) => self.record_or_escalate(item, UrlKind::Article, err),
        }
    }

    /// Record a handler failure as a per-URL error, except storage failures,
    /// which mean the disk is unusable and abort the crawl.
    fn record_or_escalate(
        &mut self,
        item: &UrlItem,
        kind: UrlKind,
        err: anyhow::Error,
    ) -> Result<()> {
        let message = format!("{err:#}");
        self.progress.update(
            &item.url,
            ProcessStatus::Error,
            Some(kind),
            None,
            Some(&message),
        );
        self.session.errors += 1;
        if categorize_error(&message) == "storage_error" {
            return Err(err);
        }
        warn!(url = %item.url, "Handler failed: {message}");
        Ok(())
    }

    fn checkpoint(&self) {
        debug!("Checkpointing crawler state");
        if let Err(err) = self.frontier.save() {
            warn!("Failed to save queue state: {err:#}");
        }
        if let Err(err) = self.dedup.save() {
            warn!("Failed to save dedup state: {err:#}");
        }
        if let Err(err) = self.progress.save() {
            warn!("Failed to save progress state: {err:#}");
        }
    }
}
