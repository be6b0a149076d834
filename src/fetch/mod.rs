//! Rate-limited fetching with tiered retry, a connectivity probe, and the
//! operator-in-the-loop circuit breaker.

pub mod console;
pub mod gateway;

pub use console::{OperatorChoice, OperatorConsole, StdinConsole};
pub use gateway::{GatewayResponse, HttpGateway, ReqwestGateway, TransportError, TransportErrorKind};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

/// Probe target used to tell "site is down" apart from "network is down".
pub const CONNECTIVITY_PROBE_URL: &str = "https://www.google.com";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Completed operator-approved retry cycles before the breaker forces a skip.
const MAX_USER_RETRY_CYCLES: u32 = 3;

/// Status codes retries can never fix.
const PERMANENT_STATUSES: &[u16] = &[404, 403, 410, 451];

/// Terminal failure classification for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    PermanentFetchFailure,
    TransientFetchFailureExhausted,
    RedirectLoop,
    ConnectivitySkip,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::PermanentFetchFailure => "permanent_fetch_failure",
            FailureKind::TransientFetchFailureExhausted => "transient_fetch_failure_exhausted",
            FailureKind::RedirectLoop => "redirect_loop",
            FailureKind::ConnectivitySkip => "connectivity_skip",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status_code: u16,
    pub body: String,
    pub content_length: usize,
    pub headers: BTreeMap<String, String>,
}

pub type FetchResult = Result<FetchedPage, FetchFailure>;

/// Everything the fetcher counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchStats {
    pub requests_made: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries_attempted: u64,
    pub permanent_failures: u64,
    pub client_errors: u64,
    pub connection_errors: u64,
    pub timeout_errors: u64,
    pub redirect_errors: u64,
    pub other_errors: u64,
    pub total_failures: u64,
    pub connectivity_tests: u64,
    pub connectivity_successes: u64,
    pub connectivity_failures: u64,
    pub skipped_urls: u64,
    pub user_retries: u64,
    pub user_retry_successes: u64,
    pub user_decisions: BTreeMap<String, u64>,
    pub circuit_breaker_activations: u64,
}

/// Outcome of one full retry schedule.
enum ScheduleOutcome {
    /// A failure retries cannot help with.
    NoRetry(FetchFailure),
    /// The retry budget is spent; carries the last error seen.
    Exhausted(String),
}

/// Rate-limited HTTP fetcher for a single site.
pub struct Fetcher {
    gateway: Box<dyn HttpGateway>,
    console: Box<dyn OperatorConsole>,
    request_delay: Duration,
    max_retries: u32,
    timeout: Duration,
    shutdown: Arc<AtomicBool>,
    last_request: Mutex<Option<Instant>>,
    stats: Mutex<FetchStats>,
}

impl Fetcher {
    pub fn new(
        gateway: Box<dyn HttpGateway>,
        console: Box<dyn OperatorConsole>,
        request_delay: f64,
        max_retries: u32,
        request_timeout: u64,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            gateway,
            console,
            request_delay: Duration::from_secs_f64(request_delay.max(0.0)),
            max_retries,
            timeout: Duration::from_secs(request_timeout),
            shutdown,
            last_request: Mutex::new(None),
            stats: Mutex::new(FetchStats::default()),
        }
    }

    /// Fetch a page, retrying transient failures and falling back to the
    /// connectivity dialog when the whole schedule fails.
    pub fn get(&self, url: &str) -> FetchResult {
        self.enforce_rate_limit();
        match self.run_schedule(url, false) {
            Ok(page) => Ok(page),
            Err(ScheduleOutcome::NoRetry(failure)) => Err(failure),
            Err(ScheduleOutcome::Exhausted(last_error)) => self.handle_exhausted(url, last_error),
        }
    }

    pub fn stats(&self) -> FetchStats {
        self.stats.lock().expect("fetch stats lock poisoned").clone()
    }

    /// One pass of up to `max_retries + 1` attempts with backoff.
    fn run_schedule(&self, url: &str, user_retry: bool) -> Result<FetchedPage, ScheduleOutcome> {
        let attempts = self.max_retries + 1;
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            if attempt > 0 && self.shutdown.load(Ordering::SeqCst) {
                return Err(ScheduleOutcome::NoRetry(FetchFailure::new(
                    FailureKind::TransientFetchFailureExhausted,
                    format!("Shutdown requested during retries; last error: {last_error}"),
                )));
            }
            debug!(url, attempt = attempt + 1, total = attempts, user_retry, "Fetching");

            match self.gateway.get(url, self.timeout) {
                Ok(response) => {
                    let mut stats = self.stats.lock().expect("fetch stats lock poisoned");
                    stats.requests_made += 1;
                    if response.status == 200 {
                        stats.successful_requests += 1;
                        if user_retry {
                            stats.user_retry_successes += 1;
                        }
                        drop(stats);
                        let content_length = response.body.len();
                        debug!(url, bytes = content_length, "Fetched successfully");
                        return Ok(FetchedPage {
                            url: url.to_string(),
                            status_code: response.status,
                            body: response.body,
                            content_length,
                            headers: response.headers,
                        });
                    }
                    stats.failed_requests += 1;
                    let message = format!("HTTP {} {}", response.status, status_reason(response.status));
                    warn!(url, status = response.status, "Request returned an error status");
                    if PERMANENT_STATUSES.contains(&response.status) {
                        stats.permanent_failures += 1;
                        return Err(ScheduleOutcome::NoRetry(FetchFailure::new(
                            FailureKind::PermanentFetchFailure,
                            message,
                        )));
                    }
                    if (400..500).contains(&response.status)
                        && response.status != 408
                        && response.status != 429
                    {
                        stats.client_errors += 1;
                        return Err(ScheduleOutcome::NoRetry(FetchFailure::new(
                            FailureKind::PermanentFetchFailure,
                            message,
                        )));
                    }
                    last_error = message;
                }
                Err(transport) => {
                    let mut stats = self.stats.lock().expect("fetch stats lock poisoned");
                    match transport.kind {
                        TransportErrorKind::Connection => {
                            stats.connection_errors += 1;
                            last_error = format!("Connection error: {}", transport.message);
                        }
                        TransportErrorKind::Timeout => {
                            stats.timeout_errors += 1;
                            last_error = format!("Timeout: {}", transport.message);
                        }
                        TransportErrorKind::TooManyRedirects => {
                            stats.redirect_errors += 1;
                            return Err(ScheduleOutcome::NoRetry(FetchFailure::new(
                                FailureKind::RedirectLoop,
                                format!("Too many redirects: {}", transport.message),
                            )));
                        }
                        TransportErrorKind::Other => {
                            stats.other_errors += 1;
                            last_error = transport.message.clone();
                        }
                    }
                    warn!(url, error = %last_error, "Request failed");
                }
            }

            if attempt + 1 < attempts {
                let wait = self.backoff(url, attempt);
                debug!(url, wait_secs = wait.as_secs_f64(), "Waiting before retry");
                std::thread::sleep(wait);
                self.stats.lock().expect("fetch stats lock poisoned").retries_attempted += 1;
            }
        }

        Err(ScheduleOutcome::Exhausted(last_error))
    }

    /// All attempts failed: probe connectivity and, when the network itself
    /// is down, hand the decision to the operator with a 3-cycle breaker.
    fn handle_exhausted(&self, url: &str, last_error: String) -> FetchResult {
        let attempts = self.max_retries + 1;
        error!(url, attempts, last_error = %last_error, "All fetch attempts failed");

        if self.probe_connectivity() {
            info!(url, "Connectivity is fine; treating URL as a permanent failure");
            self.stats.lock().expect("fetch stats lock poisoned").total_failures += 1;
            return Err(FetchFailure::new(
                FailureKind::TransientFetchFailureExhausted,
                format!("All {attempts} attempts failed; last error: {last_error}"),
            ));
        }
        warn!(url, "Connectivity test failed, asking the operator");

        let mut cycle = 0;
        while cycle < MAX_USER_RETRY_CYCLES {
            let choice = self
                .console
                .ask(url, cycle + 1, MAX_USER_RETRY_CYCLES, attempts);
            {
                let mut stats = self.stats.lock().expect("fetch stats lock poisoned");
                *stats
                    .user_decisions
                    .entry(choice.as_str().to_string())
                    .or_default() += 1;
            }
            match choice {
                OperatorChoice::Skip => {
                    info!(url, "Operator chose to skip");
                    let mut stats = self.stats.lock().expect("fetch stats lock poisoned");
                    stats.skipped_urls += 1;
                    stats.total_failures += 1;
                    return Err(FetchFailure::new(
                        FailureKind::ConnectivitySkip,
                        "Operator skipped URL after repeated connection failures",
                    ));
                }
                OperatorChoice::Continue => {
                    cycle += 1;
                    info!(url, cycle, max = MAX_USER_RETRY_CYCLES, "Operator requested a retry");
                    self.stats.lock().expect("fetch stats lock poisoned").user_retries += 1;

                    let failure = match self.run_schedule(url, true) {
                        Ok(page) => return Ok(page),
                        Err(ScheduleOutcome::NoRetry(failure)) => failure,
                        Err(ScheduleOutcome::Exhausted(message)) => FetchFailure::new(
                            FailureKind::TransientFetchFailureExhausted,
                            format!("All {attempts} attempts failed again; last error: {message}"),
                        ),
                    };
                    if self.probe_connectivity() {
                        info!(url, "Connectivity recovered but the URL still fails");
                        self.stats.lock().expect("fetch stats lock poisoned").total_failures += 1;
                        return Err(failure);
                    }
                    if cycle >= MAX_USER_RETRY_CYCLES {
                        warn!(url, "Circuit breaker activated, forcing a skip");
                        let mut stats = self.stats.lock().expect("fetch stats lock poisoned");
                        stats.circuit_breaker_activations += 1;
                        stats.skipped_urls += 1;
                        stats.total_failures += 1;
                        return Err(FetchFailure::new(
                            FailureKind::ConnectivitySkip,
                            format!(
                                "Circuit breaker activated after {MAX_USER_RETRY_CYCLES} retry cycles; last error: {}",
                                failure.message
                            ),
                        ));
                    }
                    // Still no network: go around and ask again.
                }
            }
        }

        // The breaker above is the only way out of the loop.
        let mut stats = self.stats.lock().expect("fetch stats lock poisoned");
        stats.skipped_urls += 1;
        stats.total_failures += 1;
        Err(FetchFailure::new(
            FailureKind::ConnectivitySkip,
            "Retry cycles exhausted; skipping URL",
        ))
    }

    /// GET against a well-known host to decide whether the network is up.
    fn probe_connectivity(&self) -> bool {
        debug!("Testing network connectivity");
        {
            let mut stats = self.stats.lock().expect("fetch stats lock poisoned");
            stats.connectivity_tests += 1;
        }
        let up = matches!(
            self.gateway.get(CONNECTIVITY_PROBE_URL, PROBE_TIMEOUT),
            Ok(response) if response.status == 200
        );
        let mut stats = self.stats.lock().expect("fetch stats lock poisoned");
        if up {
            stats.connectivity_successes += 1;
        } else {
            stats.connectivity_failures += 1;
            warn!("Network connectivity test failed");
        }
        up
    }

    /// Sleep so request starts are at least `request_delay` apart.
    fn enforce_rate_limit(&self) {
        let mut last = self.last_request.lock().expect("rate limit lock poisoned");
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_delay {
                let wait = self.request_delay - elapsed;
                debug!(wait_secs = wait.as_secs_f64(), "Rate limiting");
                std::thread::sleep(wait);
            }
        }
        *last = Some(Instant::now());
    }

    /// Exponential backoff with a deterministic ±10% jitter derived from the
    /// URL, so retry timing is reproducible per URL.
    fn backoff(&self, url: &str, attempt: u32) -> Duration {
        let base = self.request_delay.as_secs_f64() * f64::from(1u32 << attempt.min(16));
        let jitter = url_jitter(url);
        Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
    }
}

/// Map a URL onto a jitter factor in [-0.1, 0.1].
fn url_jitter(url: &str) -> f64 {
    let digest = Sha256::digest(url.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(bytes);
    (value % 2001) as f64 / 10_000.0 - 0.1
}

fn status_reason(status: u16) -> &'static str {
    match status {
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        410 => "Gone",
        429 => "Too Many Requests",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Error",
    }
}
