use crate::support::CrawlHarness;
use wikiharvest::{UrlFrontier, UrlKind};

fn frontier(harness: &CrawlHarness) -> UrlFrontier {
    UrlFrontier::new(harness.state_dir().join("queue_state.json"))
}

#[test]
fn categories_always_dequeue_before_articles() {
    let harness = CrawlHarness::new();
    let frontier = frontier(&harness);

    // Interleave three categories and three articles.
    assert!(frontier.add("https://en.wikipedia.org/wiki/A1", UrlKind::Article, 0));
    assert!(frontier.add("https://en.wikipedia.org/wiki/Category:C1", UrlKind::Category, 0));
    assert!(frontier.add("https://en.wikipedia.org/wiki/A2", UrlKind::Article, 0));
    assert!(frontier.add("https://en.wikipedia.org/wiki/Category:C2", UrlKind::Category, 1));
    assert!(frontier.add("https://en.wikipedia.org/wiki/Category:C3", UrlKind::Category, 2));
    assert!(frontier.add("https://en.wikipedia.org/wiki/A3", UrlKind::Article, 1));

    let mut kinds = Vec::new();
    let mut urls = Vec::new();
    while let Some(item) = frontier.next() {
        kinds.push(item.url_type);
        urls.push(item.url);
    }

    assert_eq!(
        kinds,
        vec![
            UrlKind::Category,
            UrlKind::Category,
            UrlKind::Category,
            UrlKind::Article,
            UrlKind::Article,
            UrlKind::Article,
        ],
        "all categories must come out before any article"
    );
    // Within a priority class, insertion order is preserved.
    assert!(urls[0].ends_with("C1") && urls[1].ends_with("C2") && urls[2].ends_with("C3"));
    assert!(urls[3].ends_with("A1") && urls[4].ends_with("A2") && urls[5].ends_with("A3"));
}

#[test]
fn pending_and_completed_never_hold_duplicates() {
    let harness = CrawlHarness::new();
    let frontier = frontier(&harness);
    let url = "https://en.wikipedia.org/wiki/Singapore";

    assert!(frontier.add(url, UrlKind::Article, 0));
    assert!(!frontier.add(url, UrlKind::Article, 0), "pending dedup");
    // Variants of the same canonical URL are also rejected.
    assert!(!frontier.add("https://EN.wikipedia.org/wiki/Singapore/", UrlKind::Article, 0));
    assert_eq!(frontier.size(), 1);

    let item = frontier.next().expect("one entry queued");
    frontier.mark_completed(&item.url);
    assert!(
        !frontier.add(url, UrlKind::Article, 0),
        "completed URLs must not re-enter the frontier"
    );
    assert!(frontier.is_empty());

    // The union of pending and completed holds each canonical URL once.
    frontier.add("https://en.wikipedia.org/wiki/Other", UrlKind::Article, 0);
    let pending = frontier.pending_urls();
    let completed = frontier.completed_urls();
    assert_eq!(pending.len(), 1);
    assert_eq!(completed.len(), 1);
    assert!(pending.iter().all(|u| !completed.contains(u)));

    let stats = frontier.stats();
    assert_eq!(stats.urls_added, 2);
    assert_eq!(stats.urls_completed, 1);
}

#[test]
fn stats_track_pending_by_kind() {
    let harness = CrawlHarness::new();
    let frontier = frontier(&harness);
    frontier.add("https://en.wikipedia.org/wiki/Category:X", UrlKind::Category, 0);
    frontier.add("https://en.wikipedia.org/wiki/Y", UrlKind::Article, 0);
    frontier.add("https://en.wikipedia.org/wiki/Z", UrlKind::Article, 0);

    let stats = frontier.stats();
    assert_eq!(stats.categories_pending, 1);
    assert_eq!(stats.articles_pending, 2);

    frontier.next();
    let stats = frontier.stats();
    assert_eq!(stats.categories_pending, 0);
    assert_eq!(stats.articles_pending, 2);
}
