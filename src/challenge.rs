//! Getting past the site's bot challenge.
//!
//! When the site starts answering 429 it wants a human check. The page is
//! loaded in a throwaway browser and polled until the real document shows up.
//! The browser is launched per challenge and closed once it's solved.

use crate::config::ChallengeConfig;
use crate::error::FetchError;
use crate::fetcher::Page;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Element that only exists on the challenge interstitial.
static CHALLENGE_MARKER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#".footer[role="contentinfo"]"#).unwrap());

/// Returns true if `html` is the bot challenge page rather than real content.
pub fn is_challenge_page(html: &str) -> bool {
    Html::parse_document(html)
        .select(&CHALLENGE_MARKER)
        .next()
        .is_some()
}

/// Result of a challenge resolution that didn't fail.
#[derive(Debug)]
pub enum ChallengeOutcome {
    /// The real page, once the challenge let us through.
    Page(Page),

    /// The run was cancelled while waiting.
    Cancelled,
}

/// Loads a page out of band until it is no longer a challenge.
#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    /// Resolves `url`. There is no timeout; only `cancel` stops the wait.
    async fn resolve(&self, url: &str, cancel: &CancellationToken) -> Result<ChallengeOutcome, FetchError>;
}

/// Resolver driving a Chromium instance over CDP.
pub struct BrowserResolver {
    config: ChallengeConfig,
}

impl BrowserResolver {
    pub fn new(config: ChallengeConfig) -> Self {
        Self { config }
    }

    async fn wait_for_page(
        &self,
        session: &BrowserSession,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ChallengeOutcome, FetchError> {
        let page = session.browser()?.new_page(url).await?;
        poll_until_passed(&page, url, Duration::from_millis(self.config.poll_interval_ms), cancel).await
    }
}

/// Something whose current document can be read repeatedly.
#[async_trait]
trait DocumentSource: Send + Sync {
    async fn current_html(&self) -> Result<String, FetchError>;
}

#[async_trait]
impl DocumentSource for chromiumoxide::Page {
    async fn current_html(&self) -> Result<String, FetchError> {
        Ok(self.content().await?)
    }
}

/// Reads `source` every `interval` until it shows something other than the
/// challenge page.
async fn poll_until_passed(
    source: &dyn DocumentSource,
    url: &str,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<ChallengeOutcome, FetchError> {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ChallengeOutcome::Cancelled),
            _ = ticker.tick() => {}
        }

        // Content can't be read while the challenge is redirecting; try again next tick.
        let html = match source.current_html().await {
            Ok(html) => html,
            Err(e) => {
                debug!("Page not readable yet: {}", e);
                continue;
            }
        };

        if is_challenge_page(&html) {
            debug!(%url, "Still on challenge page");
            continue;
        }

        info!(%url, "Challenge passed");
        return Ok(ChallengeOutcome::Page(Page::new(url, html)));
    }
}

#[async_trait]
impl ChallengeResolver for BrowserResolver {
    async fn resolve(&self, url: &str, cancel: &CancellationToken) -> Result<ChallengeOutcome, FetchError> {
        if cancel.is_cancelled() {
            return Ok(ChallengeOutcome::Cancelled);
        }

        info!(%url, headless = self.config.headless, "Opening browser to pass challenge");
        let mut session = BrowserSession::launch(&self.config).await?;
        let result = self.wait_for_page(&session, url, cancel).await;
        session.close().await;
        result
    }
}

/// A running browser and the task pumping its CDP events.
struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl BrowserSession {
    async fn launch(config: &ChallengeConfig) -> Result<Self, FetchError> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-sandbox");

        if config.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build().map_err(FetchError::Challenge)?;
        let (browser, mut handler) = Browser::launch(browser_config).await?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler: Some(handle),
        })
    }

    fn browser(&self) -> Result<&Browser, FetchError> {
        self.browser
            .as_ref()
            .ok_or_else(|| FetchError::Challenge("Browser already closed".to_string()))
    }

    /// Closes the browser and waits for the event loop to finish.
    async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Error closing browser: {}", e);
            }
            if let Some(handle) = self.handler.take() {
                let _ = handle.await;
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            let handler = self.handler.take();
            tokio::spawn(async move {
                let _ = browser.close().await;
                if let Some(h) = handler {
                    let _ = h.await;
                }
            });
        }
    }
}
