//! ffdown - fanfiction.net story downloader.
//!
//! This library provides functionality for:
//! - Fetching a story's pages from the mobile and desktop sites
//! - Getting past the site's bot check with a real browser
//! - Resuming an interrupted download from a local cache
//! - Packaging the finished story as an EPUB

pub mod book;
pub mod cache;
pub mod challenge;
pub mod config;
pub mod console;
pub mod download;
pub mod epub;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod logging;
pub mod site;
pub mod user_agent;
pub mod utils;

// Re-export commonly used types
pub use book::{Author, Book, Chapter, Metadata};
pub use cache::{BookCache, CacheSlot, FileCacheSlot, MemoryCacheSlot};
pub use challenge::{BrowserResolver, ChallengeOutcome, ChallengeResolver};
pub use config::Config;
pub use console::{Console, StatusSink};
pub use download::{Downloader, RunContext, RunOutcome, RunState};
pub use epub::{Encoder, EpubEncoder};
pub use error::{CacheError, ConfigError, DownloadError, EncodeError, ExtractError, FetchError};
pub use fetcher::{FetchOutcome, Page, PageFetcher, ReqwestTransport, Transport};
pub use site::{PageVariant, StoryRef};
