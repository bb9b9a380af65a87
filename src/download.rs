//! The download run.
//!
//! A run builds the book from the story header, merges what an earlier run
//! already fetched, then fetches the missing chapters one at a time. Chapters
//! come from the mobile site, which is lighter; when the site rate limits us
//! the page is pushed through the challenge resolver instead. A failed
//! chapter is recorded and saved, and the run moves on to the next one.

use crate::book::{Book, merge};
use crate::cache::BookCache;
use crate::challenge::{ChallengeOutcome, ChallengeResolver};
use crate::console::StatusSink;
use crate::epub::Encoder;
use crate::error::{DownloadError, EncodeError, FetchError};
use crate::extract::{parse_chapter, parse_overview};
use crate::fetcher::{FetchOutcome, Page, PageFetcher};
use crate::site::{PageVariant, StoryRef};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    FetchingOverview,
    FetchingChapters,
    Encoding,
    Done,
    Failed,
}

/// Per-run state shared with the caller.
///
/// The caller keeps a handle to cancel the run and to watch its state.
/// Cancelling is cooperative: the run stops at the next fetch boundary and
/// never interrupts a request already in flight.
#[derive(Debug)]
pub struct RunContext {
    cancel: CancellationToken,
    state: Mutex<RunState>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Token to cancel the run from elsewhere.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, next: RunState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let previous = *state;
        debug!(from = ?previous, to = ?next, "Run state");
        *state = next;
    }
}

/// How a run ended, short of a fatal error.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every chapter was fetched and the book encoded.
    Completed { book: Book, artifact: Vec<u8> },

    /// Some chapters failed. Their errors are saved in the cache.
    Incomplete { book: Book, failed: Vec<u32> },

    /// The run was cancelled. Progress so far is saved.
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// How the chapter loop ended.
enum ChapterLoop {
    Complete,
    Failed(Vec<u32>),
    Cancelled,
}

/// Drives a story download from URL to finished document.
pub struct Downloader {
    fetcher: PageFetcher,
    resolver: Box<dyn ChallengeResolver>,
    cache: BookCache,
    encoder: Box<dyn Encoder>,
    status: Box<dyn StatusSink>,
}

impl Downloader {
    pub fn new(
        fetcher: PageFetcher,
        resolver: Box<dyn ChallengeResolver>,
        cache: BookCache,
        encoder: Box<dyn Encoder>,
        status: Box<dyn StatusSink>,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            cache,
            encoder,
            status,
        }
    }

    pub fn cache(&self) -> &BookCache {
        &self.cache
    }

    /// File extension of the documents this downloader produces.
    pub fn extension(&self) -> &'static str {
        self.encoder.extension()
    }

    /// Downloads the story at `source_url`.
    ///
    /// Fatal conditions are reported on the status sink and returned as
    /// errors. Failed chapters and cancellation are not errors; they come back
    /// as [`RunOutcome`] variants.
    pub async fn run(&self, source_url: &str, ctx: &RunContext) -> Result<RunOutcome, DownloadError> {
        let result = self.run_inner(source_url, ctx).await;

        match &result {
            Ok(RunOutcome::Completed { .. }) => ctx.enter(RunState::Done),
            Ok(_) => {
                ctx.enter(RunState::Failed);
                self.status.rate_limited(false);
            }
            Err(e) => {
                ctx.enter(RunState::Failed);
                self.status.rate_limited(false);
                self.status.error(&e.to_string());
            }
        }

        result
    }

    async fn run_inner(&self, source_url: &str, ctx: &RunContext) -> Result<RunOutcome, DownloadError> {
        ctx.enter(RunState::Preparing);
        self.status.progress("Preparing download...");
        let story = StoryRef::parse(source_url)?;
        let cached = self.cache.load(&story.id);
        if let Some(cached) = &cached {
            info!(
                story = %story.id,
                fetched = cached.fetched_count(),
                total = cached.chapters.len(),
                "Resuming from cache"
            );
        }
        let download_time = chrono::Utc::now().timestamp();

        ctx.enter(RunState::FetchingOverview);
        self.status.progress("Fetching story information");
        let Some(mut book) = self
            .fetch_overview(&story, cached.as_ref(), download_time, ctx)
            .await?
        else {
            return Ok(RunOutcome::Cancelled);
        };
        if let Some(cached) = cached {
            merge(&mut book, cached);
        }
        info!(
            story = %book.id,
            title = %book.title,
            chapters = book.chapters.len(),
            "Story information loaded"
        );

        ctx.enter(RunState::FetchingChapters);
        let chapters = self.fetch_chapters(&story, &mut book, ctx).await;
        self.status.rate_limited(false);
        self.cache.save(&book)?;

        match chapters? {
            ChapterLoop::Complete => {}
            ChapterLoop::Failed(failed) => {
                warn!(?failed, "Some chapters could not be fetched");
                return Ok(RunOutcome::Incomplete { book, failed });
            }
            ChapterLoop::Cancelled => {
                info!("Download cancelled");
                return Ok(RunOutcome::Cancelled);
            }
        }

        ctx.enter(RunState::Encoding);
        self.status.progress("Converting to EPUB");
        let record = serde_json::to_value(&book).map_err(EncodeError::from)?;
        let artifact = self.encoder.encode(&record)?;

        Ok(RunOutcome::Completed { book, artifact })
    }

    /// Builds the book from the desktop page.
    ///
    /// From the mobile site the desktop page is requested with a desktop
    /// identity; the chapter asked for is the first one still missing so its
    /// body comes along for free. From the desktop site the page the URL
    /// points at is used. Returns `None` when cancelled.
    async fn fetch_overview(
        &self,
        story: &StoryRef,
        cached: Option<&Book>,
        download_time: i64,
        ctx: &RunContext,
    ) -> Result<Option<Book>, DownloadError> {
        let (url, want_desktop) = match story.origin {
            PageVariant::Mobile => {
                let chapter = cached
                    .and_then(Book::first_missing_chapter)
                    .map(|c| c.num)
                    .unwrap_or(1);
                (story.desktop_url(Some(chapter)), true)
            }
            PageVariant::Desktop => (story.desktop_url(story.chapter), false),
        };

        let Some(page) = self.fetch_or_resolve(&url, want_desktop, ctx).await? else {
            return Ok(None);
        };

        Ok(Some(parse_overview(&page, story, download_time)?))
    }

    /// Fetches every chapter that has no contents yet, in order.
    async fn fetch_chapters(
        &self,
        story: &StoryRef,
        book: &mut Book,
        ctx: &RunContext,
    ) -> Result<ChapterLoop, DownloadError> {
        let total = book.chapters.len();
        let mut failed = Vec::new();

        for index in 0..total {
            if book.chapters[index].is_fetched() {
                continue;
            }

            let num = book.chapters[index].num;
            self.status
                .progress(&format!("Fetching chapter {}/{}", index + 1, total));

            match self.fetch_chapter(story, num, ctx).await {
                Ok(Some(contents)) => book.chapters[index].set_contents(contents),
                Ok(None) => return Ok(ChapterLoop::Cancelled),
                Err(e) => {
                    error!(chapter = num, "Error fetching chapter: {}", e);
                    book.chapters[index].set_error(&e);
                    self.cache.save(book)?;
                    failed.push(num);
                }
            }
        }

        if failed.is_empty() {
            Ok(ChapterLoop::Complete)
        } else {
            Ok(ChapterLoop::Failed(failed))
        }
    }

    /// Fetches one chapter body. Returns `None` when cancelled.
    async fn fetch_chapter(
        &self,
        story: &StoryRef,
        num: u32,
        ctx: &RunContext,
    ) -> Result<Option<String>, FetchError> {
        let mut variant = PageVariant::Mobile;
        let mut url = story.mobile_url(Some(num));

        let page = match self.fetcher.fetch(&url, false, ctx.token()).await? {
            FetchOutcome::Page(page) => page,
            FetchOutcome::Cancelled => return Ok(None),
            FetchOutcome::RateLimited => {
                // Started from the desktop site: the challenge is solved there, so
                // fetch the desktop page through it.
                if story.origin == PageVariant::Desktop {
                    variant = PageVariant::Desktop;
                    url = story.desktop_url(Some(num));
                }
                match self.resolve_challenge(&url, ctx).await? {
                    Some(page) => page,
                    None => return Ok(None),
                }
            }
        };

        Ok(Some(parse_chapter(variant, &page)?))
    }

    async fn fetch_or_resolve(
        &self,
        url: &str,
        want_desktop: bool,
        ctx: &RunContext,
    ) -> Result<Option<Page>, FetchError> {
        match self.fetcher.fetch(url, want_desktop, ctx.token()).await? {
            FetchOutcome::Page(page) => Ok(Some(page)),
            FetchOutcome::Cancelled => Ok(None),
            FetchOutcome::RateLimited => self.resolve_challenge(url, ctx).await,
        }
    }

    async fn resolve_challenge(&self, url: &str, ctx: &RunContext) -> Result<Option<Page>, FetchError> {
        self.status.rate_limited(true);
        match self.resolver.resolve(url, ctx.token()).await? {
            ChallengeOutcome::Page(page) => Ok(Some(page)),
            ChallengeOutcome::Cancelled => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::tests::sample_book;
    use crate::cache::MemoryCacheSlot;
    use crate::config::HttpConfig;
    use crate::extract::tests::{desktop_page, mobile_page};
    use crate::fetcher::tests::MockTransport;
    use async_trait::async_trait;
    use std::sync::Arc;

    const MOBILE_URL: &str = "https://m.fanfiction.net/s/42/1/The-Long-Road";
    const DESKTOP_URL: &str = "https://www.fanfiction.net/s/42/1/The-Long-Road";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Progress(String),
        RateLimited(bool),
        Error(String),
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Error(msg) => Some(msg),
                    _ => None,
                })
                .collect()
        }
    }

    impl StatusSink for RecordingSink {
        fn progress(&self, message: &str) {
            self.events.lock().unwrap().push(Event::Progress(message.to_string()));
        }

        fn rate_limited(&self, active: bool) {
            self.events.lock().unwrap().push(Event::RateLimited(active));
        }

        fn error(&self, message: &str) {
            self.events.lock().unwrap().push(Event::Error(message.to_string()));
        }
    }

    /// Resolver that answers from a fixed map and records what it was asked.
    #[derive(Clone, Default)]
    struct FakeResolver {
        pages: Arc<Mutex<Vec<(String, String)>>>,
        asked: Arc<Mutex<Vec<String>>>,
        give_up: Arc<Mutex<bool>>,
    }

    impl FakeResolver {
        /// Makes every resolution end as if the run was cancelled while waiting.
        fn give_up(&self) {
            *self.give_up.lock().unwrap() = true;
        }

        fn serve(&self, url: &str, body: String) {
            self.pages.lock().unwrap().push((url.to_string(), body));
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChallengeResolver for FakeResolver {
        async fn resolve(&self, url: &str, _cancel: &CancellationToken) -> Result<ChallengeOutcome, FetchError> {
            self.asked.lock().unwrap().push(url.to_string());
            if *self.give_up.lock().unwrap() {
                return Ok(ChallengeOutcome::Cancelled);
            }
            self.pages
                .lock()
                .unwrap()
                .iter()
                .find(|(u, _)| u == url)
                .map(|(u, body)| ChallengeOutcome::Page(Page::new(u.clone(), body.clone())))
                .ok_or_else(|| FetchError::Challenge(format!("no page for {}", url)))
        }
    }

    struct FailingEncoder;

    impl Encoder for FailingEncoder {
        fn extension(&self) -> &'static str {
            "bin"
        }

        fn encode(&self, _record: &serde_json::Value) -> Result<Vec<u8>, EncodeError> {
            Err(EncodeError::Epub("disk full".to_string()))
        }
    }

    /// Encoder that returns the chapter count as its only byte.
    struct CountingEncoder;

    impl Encoder for CountingEncoder {
        fn extension(&self) -> &'static str {
            "bin"
        }

        fn encode(&self, record: &serde_json::Value) -> Result<Vec<u8>, EncodeError> {
            let book: Book = serde_json::from_value(record.clone())?;
            Ok(vec![book.chapters.len() as u8])
        }
    }

    struct Harness {
        transport: MockTransport,
        resolver: FakeResolver,
        sink: RecordingSink,
        downloader: Downloader,
    }

    fn harness_with(encoder: Box<dyn Encoder>, slot: MemoryCacheSlot) -> Harness {
        let transport = MockTransport::default();
        let resolver = FakeResolver::default();
        let sink = RecordingSink::default();
        let config = HttpConfig {
            delay_between_requests_sec: 0.0,
            ..HttpConfig::default()
        };
        let downloader = Downloader::new(
            PageFetcher::new(Box::new(transport.clone()), &config),
            Box::new(resolver.clone()),
            BookCache::new(Box::new(slot)),
            encoder,
            Box::new(sink.clone()),
        );
        Harness {
            transport,
            resolver,
            sink,
            downloader,
        }
    }

    fn harness() -> Harness {
        harness_with(Box::new(CountingEncoder), MemoryCacheSlot::new())
    }

    const CHAPTERS: &[(u32, &str)] = &[(1, "Start"), (2, "Middle"), (3, "End")];

    fn mobile_chapter_url(n: u32) -> String {
        format!("https://m.fanfiction.net/s/42/{}", n)
    }

    fn desktop_chapter_url(n: u32) -> String {
        format!("https://www.fanfiction.net/s/42/{}", n)
    }

    /// Serves the desktop overview for `current` and mobile pages for the rest.
    fn serve_story(h: &Harness, current: u32) {
        h.transport.respond(
            &desktop_chapter_url(current),
            200,
            &desktop_page(CHAPTERS, current, &format!("desktop {}", current)),
        );
        for (n, _) in CHAPTERS {
            h.transport
                .respond(&mobile_chapter_url(*n), 200, &mobile_page(&format!("mobile {}", n)));
        }
    }

    #[tokio::test]
    async fn test_full_download_from_mobile() {
        let h = harness();
        serve_story(&h, 1);
        let ctx = RunContext::new();

        let outcome = h.downloader.run(MOBILE_URL, &ctx).await.unwrap();

        let RunOutcome::Completed { book, artifact } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(artifact, vec![3]);
        assert_eq!(book.chapters[0].contents.as_deref(), Some("<p>desktop 1</p>"));
        assert_eq!(book.chapters[1].contents.as_deref(), Some("<p>mobile 2</p>"));
        assert_eq!(book.chapters[2].contents.as_deref(), Some("<p>mobile 3</p>"));
        assert_eq!(ctx.state(), RunState::Done);

        // Overview with a desktop identity, then only the chapters it didn't carry.
        let seen = h.transport.seen.lock().unwrap().clone();
        assert_eq!(seen[0].url, desktop_chapter_url(1));
        assert!(seen[0].user_agent.as_deref().unwrap().contains("X11; Linux x86_64"));
        let urls = h.transport.urls();
        assert_eq!(&urls[1..], &[mobile_chapter_url(2), mobile_chapter_url(3)]);

        assert!(h.sink.events().contains(&Event::Progress("Fetching chapter 2/3".to_string())));
        assert!(h.sink.errors().is_empty());

        let cached = h.downloader.cache().load("42").unwrap();
        assert!(cached.is_complete());
    }

    #[tokio::test]
    async fn test_desktop_origin_uses_current_page() {
        let h = harness();
        serve_story(&h, 1);

        let outcome = h.downloader.run(DESKTOP_URL, &RunContext::new()).await.unwrap();

        assert!(outcome.is_success());
        let seen = h.transport.seen.lock().unwrap().clone();
        assert_eq!(seen[0].url, desktop_chapter_url(1));
        assert_eq!(seen[0].user_agent, None);
    }

    #[tokio::test]
    async fn test_resume_fetches_only_missing_chapters() {
        let slot = MemoryCacheSlot::new();
        let mut cached = sample_book("42", 3);
        cached.chapters[0].set_contents("cached 1".to_string());
        crate::cache::CacheSlot::set(&slot, &serde_json::to_string(&cached).unwrap()).unwrap();

        let h = harness_with(Box::new(CountingEncoder), slot);
        serve_story(&h, 2);

        let RunOutcome::Completed { book, .. } = h.downloader.run(MOBILE_URL, &RunContext::new()).await.unwrap()
        else {
            panic!("expected completion");
        };

        // The overview asks for chapter 2, the first one missing, and carries its body.
        assert_eq!(h.transport.urls(), vec![desktop_chapter_url(2), mobile_chapter_url(3)]);
        assert_eq!(book.chapters[0].contents.as_deref(), Some("cached 1"));
        assert_eq!(book.chapters[1].contents.as_deref(), Some("<p>desktop 2</p>"));
        assert_eq!(book.chapters[2].contents.as_deref(), Some("<p>mobile 3</p>"));
    }

    #[tokio::test]
    async fn test_cache_for_other_story_ignored() {
        let slot = MemoryCacheSlot::new();
        let mut other = sample_book("7", 3);
        for chapter in &mut other.chapters {
            chapter.set_contents("other".to_string());
        }
        crate::cache::CacheSlot::set(&slot, &serde_json::to_string(&other).unwrap()).unwrap();

        let h = harness_with(Box::new(CountingEncoder), slot);
        serve_story(&h, 1);
        let RunOutcome::Completed { book, .. } = h.downloader.run(MOBILE_URL, &RunContext::new()).await.unwrap()
        else {
            panic!("expected completion");
        };
        assert!(book.chapters.iter().all(|c| c.contents.as_deref() != Some("other")));
        assert!(h.downloader.cache().load("7").is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_progress() {
        let h = harness();
        h.transport.respond(&desktop_chapter_url(1), 200, &desktop_page(CHAPTERS, 1, "desktop 1"));
        h.transport.respond(&mobile_chapter_url(2), 500, "broken");
        h.transport.respond(&mobile_chapter_url(3), 200, &mobile_page("mobile 3"));
        let ctx = RunContext::new();

        let outcome = h.downloader.run(MOBILE_URL, &ctx).await.unwrap();

        let RunOutcome::Incomplete { failed, .. } = outcome else {
            panic!("expected incomplete run");
        };
        assert_eq!(failed, vec![2]);
        assert_eq!(ctx.state(), RunState::Failed);

        let cached = h.downloader.cache().load("42").unwrap();
        assert_eq!(cached.chapters[2].contents.as_deref(), Some("<p>mobile 3</p>"));
        assert!(cached.chapters[1].contents.is_none());
        assert!(cached.chapters[1].error.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_network_error_on_chapter_is_recorded() {
        let h = harness();
        h.transport.respond(&desktop_chapter_url(1), 200, &desktop_page(CHAPTERS, 1, "d1"));
        h.transport.fail(&mobile_chapter_url(2), "connection reset");
        h.transport.respond(&mobile_chapter_url(3), 200, &mobile_page("m3"));

        let outcome = h.downloader.run(MOBILE_URL, &RunContext::new()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Incomplete { ref failed, .. } if failed == &vec![2]));
        assert_eq!(h.transport.urls().len(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_on_mobile_origin_uses_mobile_parser() {
        let h = harness();
        h.transport.respond(&desktop_chapter_url(1), 200, &desktop_page(CHAPTERS, 1, "d1"));
        h.transport.respond(&mobile_chapter_url(2), 429, "");
        h.transport.respond(&mobile_chapter_url(3), 200, &mobile_page("m3"));
        h.resolver.serve(&mobile_chapter_url(2), mobile_page("solved 2"));

        let RunOutcome::Completed { book, .. } = h.downloader.run(MOBILE_URL, &RunContext::new()).await.unwrap()
        else {
            panic!("expected completion");
        };

        assert_eq!(h.resolver.asked(), vec![mobile_chapter_url(2)]);
        assert_eq!(book.chapters[1].contents.as_deref(), Some("<p>solved 2</p>"));
        let events = h.sink.events();
        assert!(events.contains(&Event::RateLimited(true)));
        assert_eq!(events.last(), Some(&Event::Progress("Converting to EPUB".to_string())));
        assert!(events.contains(&Event::RateLimited(false)));
    }

    #[tokio::test]
    async fn test_rate_limit_on_desktop_origin_uses_desktop_parser() {
        let h = harness();
        h.transport.respond(&desktop_chapter_url(1), 200, &desktop_page(CHAPTERS, 1, "d1"));
        h.transport.respond(&mobile_chapter_url(2), 429, "");
        h.transport.respond(&mobile_chapter_url(3), 200, &mobile_page("m3"));
        h.resolver
            .serve(&desktop_chapter_url(2), desktop_page(CHAPTERS, 2, "solved 2"));

        let RunOutcome::Completed { book, .. } = h.downloader.run(DESKTOP_URL, &RunContext::new()).await.unwrap()
        else {
            panic!("expected completion");
        };

        assert_eq!(h.resolver.asked(), vec![desktop_chapter_url(2)]);
        assert_eq!(book.chapters[1].contents.as_deref(), Some("<p>solved 2</p>"));
    }

    #[tokio::test]
    async fn test_rate_limited_overview_goes_through_resolver() {
        let h = harness();
        h.transport.respond(&desktop_chapter_url(1), 429, "");
        h.resolver.serve(&desktop_chapter_url(1), desktop_page(CHAPTERS, 1, "d1"));
        h.transport.respond(&mobile_chapter_url(2), 200, &mobile_page("m2"));
        h.transport.respond(&mobile_chapter_url(3), 200, &mobile_page("m3"));

        let outcome = h.downloader.run(MOBILE_URL, &RunContext::new()).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(h.resolver.asked(), vec![desktop_chapter_url(1)]);
    }

    #[tokio::test]
    async fn test_cancel_during_overview_challenge_clears_indicator() {
        let h = harness();
        h.transport.respond(&desktop_chapter_url(1), 429, "");
        h.resolver.give_up();
        let ctx = RunContext::new();

        let outcome = h.downloader.run(MOBILE_URL, &ctx).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Cancelled));
        let events = h.sink.events();
        assert!(events.contains(&Event::RateLimited(true)));
        assert_eq!(events.last(), Some(&Event::RateLimited(false)));
        assert!(h.sink.errors().is_empty());
        assert_eq!(ctx.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_resolver_failure_is_recorded_on_chapter() {
        let h = harness();
        h.transport.respond(&desktop_chapter_url(1), 200, &desktop_page(CHAPTERS, 1, "d1"));
        h.transport.respond(&mobile_chapter_url(2), 429, "");
        h.transport.respond(&mobile_chapter_url(3), 200, &mobile_page("m3"));

        let outcome = h.downloader.run(MOBILE_URL, &RunContext::new()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Incomplete { ref failed, .. } if failed == &vec![2]));
        let cached = h.downloader.cache().load("42").unwrap();
        assert!(cached.chapters[1].error.as_deref().unwrap().contains("Challenge"));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let h = harness();
        serve_story(&h, 1);
        let ctx = RunContext::new();
        ctx.cancel();

        let outcome = h.downloader.run(MOBILE_URL, &ctx).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert!(h.transport.urls().is_empty());
        assert!(h.sink.errors().is_empty());
        assert!(h.downloader.cache().load("42").is_none());
        assert_eq!(ctx.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_mid_run_saves_progress() {
        let h = harness();
        serve_story(&h, 1);
        let ctx = RunContext::new();
        h.transport.cancel_during(&mobile_chapter_url(2), ctx.token().clone());

        let outcome = h.downloader.run(MOBILE_URL, &ctx).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert!(!h.transport.urls().contains(&mobile_chapter_url(3)));
        assert!(h.sink.errors().is_empty());

        let cached = h.downloader.cache().load("42").unwrap();
        assert_eq!(cached.fetched_count(), 1);
        assert!(cached.chapters[1].error.is_none());
    }

    #[tokio::test]
    async fn test_unrecognized_source_is_fatal() {
        let h = harness();
        let err = h
            .downloader
            .run("https://archiveofourown.org/works/1", &RunContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::UnrecognizedSource(_)));
        assert!(h.transport.urls().is_empty());
        assert_eq!(h.sink.errors(), vec!["Unrecognised domain archiveofourown.org".to_string()]);
    }

    #[tokio::test]
    async fn test_overview_http_error_is_fatal() {
        let h = harness();
        h.transport.respond(&desktop_chapter_url(1), 404, "gone");

        let err = h.downloader.run(MOBILE_URL, &RunContext::new()).await.unwrap_err();
        assert!(matches!(err, DownloadError::Fetch(FetchError::Http { status: 404, .. })));
        assert_eq!(h.sink.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_encoder_failure_leaves_cache_intact() {
        let h = harness_with(Box::new(FailingEncoder), MemoryCacheSlot::new());
        serve_story(&h, 1);
        let ctx = RunContext::new();

        let err = h.downloader.run(MOBILE_URL, &ctx).await.unwrap_err();

        assert!(matches!(err, DownloadError::Encode(_)));
        assert_eq!(ctx.state(), RunState::Failed);
        assert!(h.sink.errors()[0].contains("disk full"));
        assert!(h.downloader.cache().load("42").unwrap().is_complete());
    }
}
