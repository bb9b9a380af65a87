//! The book record built up over a download and persisted between runs.
//!
//! Field names are part of the cache and encoder format and must stay stable.

use serde::{Deserialize, Serialize};

/// Story author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,

    /// Profile URL, always on the desktop host.
    pub link: String,
}

/// Metadata from the story header. Everything the page omits stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub category: Vec<String>,
    pub rating: Option<String>,
    pub language: Option<String>,
    pub genre: Option<String>,
    pub characters: Option<String>,
    pub chapters: Option<String>,
    pub words: Option<String>,
    pub status: Option<String>,
    pub reviews: Option<String>,
    pub favs: Option<String>,
    pub follows: Option<String>,
}

/// A single chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter number (1-based).
    pub num: u32,

    pub title: String,

    pub url: String,

    /// Chapter body as HTML. `None` until fetched.
    pub contents: Option<String>,

    /// Why the last fetch attempt failed.
    pub error: Option<String>,
}

impl Chapter {
    /// Creates an unfetched chapter.
    pub fn new(num: u32, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            num,
            title: title.into(),
            url: url.into(),
            contents: None,
            error: None,
        }
    }

    /// Returns true once the body has been fetched.
    pub fn is_fetched(&self) -> bool {
        self.contents.is_some()
    }

    /// Stores the body and clears any earlier failure.
    pub fn set_contents(&mut self, contents: String) {
        self.contents = Some(contents);
        self.error = None;
    }

    /// Records a failed fetch.
    pub fn set_error(&mut self, error: impl ToString) {
        self.contents = None;
        self.error = Some(error.to_string());
    }
}

/// A story and everything downloaded for it so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Site-assigned story id.
    pub id: String,

    /// Desktop URL of the story.
    pub source: String,

    pub title: String,

    pub blurb: String,

    pub author: Author,

    pub metadata: Metadata,

    /// Last revision, epoch seconds. `None` when never updated.
    pub updated_time: Option<i64>,

    /// Publication, epoch seconds.
    pub created_time: i64,

    /// When this download was started, epoch seconds.
    pub download_time: i64,

    pub chapters: Vec<Chapter>,
}

impl Book {
    /// Returns the first chapter that hasn't been fetched yet.
    pub fn first_missing_chapter(&self) -> Option<&Chapter> {
        self.chapters.iter().find(|c| !c.is_fetched())
    }

    /// Returns true when every chapter has a body.
    pub fn is_complete(&self) -> bool {
        self.chapters.iter().all(Chapter::is_fetched)
    }

    /// Counts chapters that have a body.
    pub fn fetched_count(&self) -> usize {
        self.chapters.iter().filter(|c| c.is_fetched()).count()
    }
}

/// Carries over chapters already fetched in an earlier run.
///
/// For every position both books share, a cached chapter that has contents
/// replaces the fresh one outright. Nothing is merged field by field.
pub fn merge(fresh: &mut Book, cached: Book) {
    for (slot, cached_chapter) in fresh.chapters.iter_mut().zip(cached.chapters) {
        if cached_chapter.is_fetched() {
            *slot = cached_chapter;
        }
    }
}
