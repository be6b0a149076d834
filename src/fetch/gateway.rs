//! Raw HTTP access behind a trait so the fetcher can be exercised without a
//! network.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

/// User-Agent identifying this crawler as an educational project.
pub const USER_AGENT: &str =
    "wikiharvest/0.1 (Educational Research Project; Contact: researcher@example.com)";

/// Classified transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connection,
    Timeout,
    TooManyRedirects,
    Other,
}

#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A completed HTTP exchange, whatever the status code.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

/// Single-method HTTP seam. Production uses [`ReqwestGateway`]; tests
/// substitute scripted responses.
pub trait HttpGateway: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<GatewayResponse, TransportError>;
}

/// Gateway over a shared blocking reqwest client.
pub struct ReqwestGateway {
    client: Client,
}

impl ReqwestGateway {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpGateway for ReqwestGateway {
    fn get(&self, url: &str, timeout: Duration) -> Result<GatewayResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response.text().map_err(classify_reqwest_error)?;
        Ok(GatewayResponse {
            status,
            body,
            headers,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_redirect() {
        TransportErrorKind::TooManyRedirects
    } else if err.is_connect() {
        TransportErrorKind::Connection
    } else {
        TransportErrorKind::Other
    };
    TransportError {
        kind,
        message: err.to_string(),
    }
}
