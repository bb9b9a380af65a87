//! Persistent snapshot of the most recent download.
//!
//! There is exactly one slot: starting a different story overwrites it.
//! Writes are synchronous so the snapshot on disk is complete before the
//! download continues.

use crate::book::Book;
use crate::error::CacheError;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Default cache filename.
pub const CACHE_FILENAME: &str = "last-download.json";

/// A single key-value slot holding a serialized book.
pub trait CacheSlot: Send + Sync {
    /// Reads the stored snapshot, if any.
    fn get(&self) -> Result<Option<String>, CacheError>;

    /// Replaces the stored snapshot.
    fn set(&self, value: &str) -> Result<(), CacheError>;
}

/// Slot backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileCacheSlot {
    path: PathBuf,
}

impl FileCacheSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheSlot for FileCacheSlot {
    fn get(&self) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, value: &str) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write next to the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Slot kept in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCacheSlot {
    value: Mutex<Option<String>>,
}

impl MemoryCacheSlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheSlot for MemoryCacheSlot {
    fn get(&self) -> Result<Option<String>, CacheError> {
        Ok(self.value.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn set(&self, value: &str) -> Result<(), CacheError> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(value.to_string());
        Ok(())
    }
}

/// Typed access to the cache slot.
pub struct BookCache {
    slot: Box<dyn CacheSlot>,
}

impl BookCache {
    pub fn new(slot: Box<dyn CacheSlot>) -> Self {
        Self { slot }
    }

    /// Loads the cached book for `story_id`.
    ///
    /// Returns `None` when nothing is cached, when the cache belongs to
    /// another story, or when the snapshot can't be read back.
    pub fn load(&self, story_id: &str) -> Option<Book> {
        let raw = match self.slot.get() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Ignoring unreadable cache: {}", e);
                return None;
            }
        };

        let book: Book = match serde_json::from_str(&raw) {
            Ok(book) => book,
            Err(e) => {
                warn!("Ignoring corrupt cache: {}", e);
                return None;
            }
        };

        if book.id != story_id {
            debug!(cached = %book.id, wanted = %story_id, "Cache holds a different story");
            return None;
        }

        Some(book)
    }

    /// Overwrites the slot with `book`.
    pub fn save(&self, book: &Book) -> Result<(), CacheError> {
        let raw = serde_json::to_string(book)?;
        self.slot.set(&raw)?;
        debug!(
            story = %book.id,
            fetched = book.fetched_count(),
            total = book.chapters.len(),
            "Saved book to cache"
        );
        Ok(())
    }
}
