//! HTTP transport and the page fetcher built on top of it.
//!
//! The fetcher turns a URL into a page, a rate-limit signal, or a
//! cancellation sentinel. Anything else the server says is an error.

use crate::config::HttpConfig;
use crate::error::FetchError;
use crate::user_agent::desktop_user_agent;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Status the site uses for rate limiting.
const TOO_MANY_REQUESTS: u16 = 429;

/// A fetched HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// URL the page was requested from.
    pub url: String,

    /// Raw HTML.
    pub body: String,
}

impl Page {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Host HTTP primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a GET request.
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<RawResponse, FetchError>;
}

/// Transport backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport using the configured identity and timeout.
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<RawResponse, FetchError> {
        let response = self.client.get(url).headers(headers).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

/// Result of a fetch that didn't fail.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The page was served.
    Page(Page),

    /// The server answered 429.
    RateLimited,

    /// The run was cancelled before the response could be used.
    Cancelled,
}

/// Fetches pages with optional desktop identity spoofing.
pub struct PageFetcher {
    transport: Box<dyn Transport>,
    user_agent: String,
    delay_between_requests_sec: f64,
}

impl PageFetcher {
    pub fn new(transport: Box<dyn Transport>, config: &HttpConfig) -> Self {
        Self {
            transport,
            user_agent: config.user_agent.clone(),
            delay_between_requests_sec: config.delay_between_requests_sec,
        }
    }

    /// Fetches `url`.
    ///
    /// With `want_desktop` the request carries the desktop translation of our
    /// User-Agent, so the server doesn't redirect to the mobile site. If no
    /// translation exists the header is left out.
    pub async fn fetch(
        &self,
        url: &str,
        want_desktop: bool,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        if cancel.is_cancelled() {
            return Ok(FetchOutcome::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(FetchOutcome::Cancelled),
            _ = rate_limit(self.delay_between_requests_sec) => {}
        }

        let mut headers = HeaderMap::new();
        if want_desktop {
            match desktop_user_agent(&self.user_agent).and_then(|ua| HeaderValue::from_str(&ua).ok())
            {
                Some(value) => {
                    headers.insert(USER_AGENT, value);
                }
                None => debug!("No desktop User-Agent for {:?}", self.user_agent),
            }
        }

        debug!(%url, want_desktop, "GET");
        let response = self.transport.get(url, headers).await?;

        if cancel.is_cancelled() {
            return Ok(FetchOutcome::Cancelled);
        }

        match response.status {
            status if status < 400 => Ok(FetchOutcome::Page(Page::new(url, response.body))),
            TOO_MANY_REQUESTS => {
                warn!(%url, "Rate limited");
                Ok(FetchOutcome::RateLimited)
            }
            status => Err(FetchError::Http {
                status,
                body: response.body,
            }),
        }
    }
}

/// Applies rate limiting delay.
pub async fn rate_limit(delay_sec: f64) {
    if delay_sec > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(delay_sec)).await;
    }
}
