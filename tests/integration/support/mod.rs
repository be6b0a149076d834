//! Shared harness for the integration tests: tempdir workspaces, scripted
//! HTTP responses, and a scripted operator console.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use wikiharvest::fetch::{
    GatewayResponse, HttpGateway, OperatorChoice, OperatorConsole, TransportError,
    TransportErrorKind, CONNECTIVITY_PROBE_URL,
};
use wikiharvest::CrawlerConfig;

/// Temp workspace owning the output directory for one test.
pub struct CrawlHarness {
    workspace: TempDir,
}

impl CrawlHarness {
    pub fn new() -> Self {
        Self {
            workspace: TempDir::new().expect("failed to create temp workspace"),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.workspace.path().join("wikipedia_data")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.output_dir().join("state")
    }

    /// Config tuned for tests: no pacing delays, everything else default.
    pub fn config(&self, start_url: &str) -> CrawlerConfig {
        let mut config = CrawlerConfig::new(start_url);
        config.output_dir = self.output_dir();
        config.request_delay = 0.0;
        config
    }

    /// Content JSON files written so far, state files excluded.
    pub fn content_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        collect_json(&self.output_dir(), &mut files);
        files.retain(|path| !path.components().any(|c| c.as_os_str() == "state"));
        files.sort();
        files
    }
}

fn collect_json(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_json(&path, files);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
}

/// One scripted response for a URL.
#[derive(Debug, Clone)]
pub enum Scripted {
    Ok(String),
    Status(u16),
    ConnectionError,
    Timeout,
    /// Connection errors for the first N requests, then 200 with the body.
    ConnectionErrorTimes(usize, String),
}

/// Gateway serving canned pages and recording every request. The
/// connectivity probe target answers 200 unless overridden.
pub struct ScriptedGateway {
    pages: Mutex<HashMap<String, Scripted>>,
    requests: Mutex<Vec<String>>,
    shutdown_after: Mutex<Option<(usize, Arc<AtomicBool>)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        let mut pages = HashMap::new();
        pages.insert(
            CONNECTIVITY_PROBE_URL.to_string(),
            Scripted::Ok("<html>ok</html>".to_string()),
        );
        Self {
            pages: Mutex::new(pages),
            requests: Mutex::new(Vec::new()),
            shutdown_after: Mutex::new(None),
        }
    }

    pub fn with_page(self, url: &str, response: Scripted) -> Self {
        self.pages
            .lock()
            .expect("gateway lock")
            .insert(url.to_string(), response);
        self
    }

    pub fn set_page(&self, url: &str, response: Scripted) {
        self.pages
            .lock()
            .expect("gateway lock")
            .insert(url.to_string(), response);
    }

    /// Trip a shutdown flag once this many page requests have been served,
    /// to simulate killing the process mid-run.
    pub fn shutdown_after(&self, requests: usize, flag: Arc<AtomicBool>) {
        *self.shutdown_after.lock().expect("gateway lock") = Some((requests, flag));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("gateway lock").clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .expect("gateway lock")
            .iter()
            .filter(|r| r.as_str() == url)
            .count()
    }
}

impl HttpGateway for ScriptedGateway {
    fn get(&self, url: &str, _timeout: Duration) -> Result<GatewayResponse, TransportError> {
        let page_request = url != CONNECTIVITY_PROBE_URL;
        let mut url_hits = 0;
        if page_request {
            let mut requests = self.requests.lock().expect("gateway lock");
            requests.push(url.to_string());
            let served = requests.len();
            url_hits = requests.iter().filter(|r| r.as_str() == url).count();
            drop(requests);
            if let Some((threshold, flag)) = &*self.shutdown_after.lock().expect("gateway lock") {
                if served >= *threshold {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        }
        let script = self
            .pages
            .lock()
            .expect("gateway lock")
            .get(url)
            .cloned()
            .unwrap_or(Scripted::Status(404));
        match script {
            Scripted::ConnectionErrorTimes(failures, body) => {
                if url_hits <= failures {
                    Err(TransportError {
                        kind: TransportErrorKind::Connection,
                        message: "connection refused".to_string(),
                    })
                } else {
                    Ok(GatewayResponse {
                        status: 200,
                        body,
                        headers: Default::default(),
                    })
                }
            }
            Scripted::Ok(body) => Ok(GatewayResponse {
                status: 200,
                body,
                headers: Default::default(),
            }),
            Scripted::Status(status) => Ok(GatewayResponse {
                status,
                body: String::new(),
                headers: Default::default(),
            }),
            Scripted::ConnectionError => Err(TransportError {
                kind: TransportErrorKind::Connection,
                message: "connection refused".to_string(),
            }),
            Scripted::Timeout => Err(TransportError {
                kind: TransportErrorKind::Timeout,
                message: "operation timed out".to_string(),
            }),
        }
    }
}

/// Console that replays a fixed list of answers, then skips.
pub struct ScriptedConsole {
    answers: Mutex<VecDeque<OperatorChoice>>,
    asks: Mutex<u32>,
}

impl ScriptedConsole {
    pub fn new(answers: Vec<OperatorChoice>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asks: Mutex::new(0),
        }
    }

    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub fn ask_count(&self) -> u32 {
        *self.asks.lock().expect("console lock")
    }
}

impl OperatorConsole for ScriptedConsole {
    fn ask(&self, _url: &str, _cycle: u32, _max: u32, _attempts: u32) -> OperatorChoice {
        *self.asks.lock().expect("console lock") += 1;
        self.answers
            .lock()
            .expect("console lock")
            .pop_front()
            .unwrap_or(OperatorChoice::Skip)
    }
}

/// Adapter letting a test keep an [`Arc`] handle to a gateway after the
/// fetcher takes ownership of its box.
pub struct SharedGateway(pub Arc<ScriptedGateway>);

impl HttpGateway for SharedGateway {
    fn get(&self, url: &str, timeout: Duration) -> Result<GatewayResponse, TransportError> {
        self.0.get(url, timeout)
    }
}

/// Same, for the scripted console.
pub struct SharedConsole(pub Arc<ScriptedConsole>);

impl OperatorConsole for SharedConsole {
    fn ask(&self, url: &str, cycle: u32, max: u32, attempts: u32) -> OperatorChoice {
        self.0.ask(url, cycle, max, attempts)
    }
}

/// A category page with the usual MediaWiki containers.
pub fn category_html(title: &str, subcategories: &[&str], articles: &[&str]) -> String {
    let subcategory_links: String = subcategories
        .iter()
        .map(|name| {
            format!(
                "<li><a href=\"/wiki/Category:{name}\">Category:{}</a></li>",
                name.replace('_', " ")
            )
        })
        .collect();
    let article_links: String = articles
        .iter()
        .map(|name| {
            format!(
                "<li><a href=\"/wiki/{name}\">{}</a></li>",
                name.replace('_', " ")
            )
        })
        .collect();
    format!(
        "<html><head><title>Category:{title}</title></head><body>\
         <h1 id=\"firstHeading\">Category:{title}</h1>\
         <div id=\"mw-content-text\"><div class=\"mw-parser-output\">\
         <div id=\"mw-subcategories\"><h2>Subcategories</h2>\
         <ul>{subcategory_links}</ul></div>\
         <div id=\"mw-pages\"><h2>Pages in category \"{title}\"</h2>\
         <ul>{article_links}</ul></div>\
         </div></div></body></html>"
    )
}

/// An article page with enough English prose to pass every gate.
pub fn article_html(title: &str) -> String {
    let readable = title.replace('_', " ");
    format!(
        "<html><head><title>{readable}</title></head><body>\
         <h1 id=\"firstHeading\">{readable}</h1>\
         <div id=\"mw-content-text\"><div class=\"mw-parser-output\">\
         <p>{readable} is a well known place that appears in many travel guides \
         and history books about the region and its culture.</p>\
         <p>The area has a long and storied history, with settlements recorded \
         over several centuries and a vibrant economy in the modern era.</p>\
         </div></div></body></html>"
    )
}
