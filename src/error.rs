//! Error types for ffdown.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use thiserror::Error;

/// Errors raised while fetching a single page.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure (DNS, connection reset, timeout, ...)
    #[error("Network request failed: {0}")]
    Network(String),

    /// Server answered with a status >= 400 other than 429
    #[error("Server returned error code {status}.\n\n{body}")]
    Http { status: u16, body: String },

    /// The isolated browser used to clear a bot challenge failed
    #[error("Challenge resolution failed: {0}")]
    Challenge(String),

    /// The page arrived but did not contain what we need
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for FetchError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        FetchError::Challenge(err.to_string())
    }
}

/// Errors raised while reading structured data out of a page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The required element isn't found in HTML
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The story header carries no creation timestamp
    #[error("No publication timestamp found on the story page")]
    MissingTimestamp,

    /// An attribute was present but could not be interpreted
    #[error("Invalid value for {name}: {value}")]
    InvalidAttribute { name: String, value: String },
}

/// Errors raised by the persistent book cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Failed to read or write the cache file
    #[error("Failed to access cache: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to (de)serialize the cached book
    #[error("Failed to serialize cached book: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a document encoder.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// The book record could not be interpreted
    #[error("Invalid book record: {0}")]
    InvalidRecord(#[from] serde_json::Error),

    /// A chapter was never fetched
    #[error("Chapter {0} has no contents")]
    MissingChapter(u32),

    /// The EPUB container could not be produced
    #[error("EPUB generation failed: {0}")]
    Epub(String),
}

/// Errors that end a download run.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The URL belongs to neither the mobile nor the desktop site
    #[error("Unrecognised domain {0}")]
    UnrecognizedSource(String),

    /// The overview page could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The overview page could not be parsed
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The cache could not be written
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The encoder rejected the finished book
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
