use std::fs;

use crate::support::CrawlHarness;
use wikiharvest::progress::ProgressTracker;
use wikiharvest::{DedupRegistry, ProcessStatus, UrlFrontier, UrlKind};

#[test]
fn frontier_save_load_preserves_order_and_sets() -> anyhow::Result<()> {
    let harness = CrawlHarness::new();
    let state_file = harness.state_dir().join("queue_state.json");

    let frontier = UrlFrontier::new(&state_file);
    frontier.add("https://en.wikipedia.org/wiki/A", UrlKind::Article, 1);
    frontier.add("https://en.wikipedia.org/wiki/Category:C1", UrlKind::Category, 0);
    frontier.add("https://en.wikipedia.org/wiki/B", UrlKind::Article, 2);
    frontier.add("https://en.wikipedia.org/wiki/Category:C2", UrlKind::Category, 1);
    frontier.mark_completed("https://en.wikipedia.org/wiki/Done");
    frontier.save()?;

    let restored = UrlFrontier::new(&state_file);
    assert!(restored.load()?);
    assert_eq!(restored.size(), 4);

    // Dequeue order is externally identical to the original.
    let original: Vec<_> = std::iter::from_fn(|| frontier.next())
        .map(|item| (item.url, item.url_type, item.depth))
        .collect();
    let reloaded: Vec<_> = std::iter::from_fn(|| restored.next())
        .map(|item| (item.url, item.url_type, item.depth))
        .collect();
    assert_eq!(original, reloaded);

    assert!(!restored.add("https://en.wikipedia.org/wiki/Done", UrlKind::Article, 0));
    let stats = restored.stats();
    assert_eq!(stats.urls_added, 4);
    assert_eq!(stats.urls_completed, 1);
    Ok(())
}

#[test]
fn dedup_save_load_preserves_membership() -> anyhow::Result<()> {
    let harness = CrawlHarness::new();
    let state_file = harness.state_dir().join("deduplication_state.json");

    let registry = DedupRegistry::new(&state_file);
    registry.mark_processed("https://en.wikipedia.org/wiki/A");
    registry.mark_processed("https://en.wikipedia.org/wiki/B");
    registry.save()?;

    let restored = DedupRegistry::new(&state_file);
    assert!(restored.load()?);
    assert!(restored.is_processed("https://en.wikipedia.org/wiki/A"));
    assert!(restored.is_processed("https://en.wikipedia.org/wiki/B#Top"));
    assert!(!restored.is_processed("https://en.wikipedia.org/wiki/C"));
    assert_eq!(restored.processed_count(), 2);
    assert_eq!(restored.stats().urls_processed, 2);
    Ok(())
}

#[test]
fn progress_save_load_preserves_observable_state() -> anyhow::Result<()> {
    let harness = CrawlHarness::new();
    let state_file = harness.state_dir().join("progress_state.json");

    let tracker = ProgressTracker::new(&state_file);
    tracker.start_crawling("https://en.wikipedia.org/wiki/Category:Singapore");
    tracker.update(
        "https://en.wikipedia.org/wiki/Category:Singapore",
        ProcessStatus::Completed,
        Some(UrlKind::Category),
        None,
        None,
    );
    tracker.update(
        "https://en.wikipedia.org/wiki/Singapore",
        ProcessStatus::Completed,
        Some(UrlKind::Article),
        Some("en"),
        None,
    );
    tracker.update(
        "https://en.wikipedia.org/wiki/Gone",
        ProcessStatus::Error,
        Some(UrlKind::Article),
        None,
        Some("HTTP 404 Not Found"),
    );
    tracker.set_pending(7);
    tracker.save()?;

    let restored = ProgressTracker::new(&state_file);
    assert!(restored.load());

    let status = restored.status();
    assert_eq!(status.total_processed, 3);
    assert_eq!(status.categories_processed, 1);
    assert_eq!(status.articles_processed, 1);
    assert_eq!(status.error_count, 1);
    assert_eq!(status.pending_urls, 7);

    assert_eq!(
        restored.url_status("https://en.wikipedia.org/wiki/Singapore"),
        Some(ProcessStatus::Completed)
    );
    assert_eq!(
        restored.url_status("https://en.wikipedia.org/wiki/Gone"),
        Some(ProcessStatus::Error)
    );

    let report = restored.report();
    assert_eq!(report.language_stats.get("en"), Some(&1));
    assert_eq!(report.error_summary.get("page_not_found"), Some(&1));
    assert!(!report.recent_urls.is_empty());

    let mut completed = restored.urls_with_status(ProcessStatus::Completed);
    completed.sort();
    assert_eq!(completed.len(), 2);
    Ok(())
}

#[test]
fn dedup_canonicalization_settings_round_trip() -> anyhow::Result<()> {
    let harness = CrawlHarness::new();
    let state_file = harness.state_dir().join("deduplication_state.json");

    let options = wikiharvest::CanonicalOptions {
        normalize_urls: true,
        remove_fragments: false,
        sort_query_params: true,
    };
    let registry = DedupRegistry::with_options(&state_file, options);
    registry.mark_processed("https://en.wikipedia.org/wiki/A#Top");
    registry.save()?;

    let restored = DedupRegistry::new(&state_file);
    assert!(restored.load()?);
    assert_eq!(restored.options(), options, "settings block must be restored");
    // Fragments are significant under the restored settings.
    assert!(restored.is_processed("https://en.wikipedia.org/wiki/A#Top"));
    assert!(!restored.is_processed("https://en.wikipedia.org/wiki/A#Bottom"));
    Ok(())
}

#[test]
fn corrupt_progress_state_is_reported_and_ignored() -> anyhow::Result<()> {
    let harness = CrawlHarness::new();
    let state_file = harness.state_dir().join("progress_state.json");
    fs::create_dir_all(harness.state_dir())?;
    fs::write(&state_file, "{ this is not json")?;

    let tracker = ProgressTracker::new(&state_file);
    assert!(!tracker.load(), "corrupt state must not load");
    let status = tracker.status();
    assert_eq!(status.total_processed, 0, "state stays empty after corruption");
    Ok(())
}
