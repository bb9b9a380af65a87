//! Story addressing for the two fanfiction.net hosts.
//!
//! The same story is served by a lightweight mobile site that only carries
//! chapter text and by the full desktop site that carries all metadata.

use crate::error::DownloadError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Host of the lightweight (chapter body only) site.
pub const MOBILE_HOST: &str = "m.fanfiction.net";

/// Host of the full (metadata and chapter body) site.
pub const DESKTOP_HOST: &str = "www.fanfiction.net";

/// Matches `/s/<story id>` optionally followed by `/<chapter>`.
static STORY_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/s/(\d+)(?:/(\d+))?").unwrap());

/// Which rendering of a page was fetched, and therefore how to parse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageVariant {
    Mobile,
    Desktop,
}

impl PageVariant {
    /// Returns the host serving this variant.
    pub fn host(self) -> &'static str {
        match self {
            PageVariant::Mobile => MOBILE_HOST,
            PageVariant::Desktop => DESKTOP_HOST,
        }
    }

    /// Classifies a host name.
    pub fn from_host(host: &str) -> Option<Self> {
        match host {
            MOBILE_HOST => Some(PageVariant::Mobile),
            DESKTOP_HOST => Some(PageVariant::Desktop),
            _ => None,
        }
    }
}

impl fmt::Display for PageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageVariant::Mobile => write!(f, "mobile"),
            PageVariant::Desktop => write!(f, "desktop"),
        }
    }
}

/// A story location parsed from a user-supplied URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRef {
    /// Site-assigned story id.
    pub id: String,

    /// Which host the URL pointed at.
    pub origin: PageVariant,

    /// Chapter the URL pointed at, if any.
    pub chapter: Option<u32>,
}

impl StoryRef {
    /// Parses a story URL on either host.
    pub fn parse(input: &str) -> Result<Self, DownloadError> {
        let parsed = url::Url::parse(input)
            .map_err(|_| DownloadError::UnrecognizedSource(input.to_string()))?;
        let host = parsed.host_str().unwrap_or_default();

        let origin = PageVariant::from_host(host)
            .ok_or_else(|| DownloadError::UnrecognizedSource(host.to_string()))?;

        let caps = STORY_PATH_REGEX
            .captures(parsed.path())
            .ok_or_else(|| DownloadError::UnrecognizedSource(input.to_string()))?;

        let id = caps[1].to_string();
        let chapter = caps
            .get(2)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|&n| n > 0);

        Ok(Self {
            id,
            origin,
            chapter,
        })
    }

    /// URL of a chapter on the given host. `None` or zero addresses the story itself.
    pub fn url(&self, variant: PageVariant, chapter: Option<u32>) -> String {
        let chapter = match chapter {
            Some(n) if n > 0 => n.to_string(),
            _ => String::new(),
        };
        format!("https://{}/s/{}/{}", variant.host(), self.id, chapter)
    }

    /// Chapter URL on the lightweight site.
    pub fn mobile_url(&self, chapter: Option<u32>) -> String {
        self.url(PageVariant::Mobile, chapter)
    }

    /// Chapter URL on the full site.
    pub fn desktop_url(&self, chapter: Option<u32>) -> String {
        self.url(PageVariant::Desktop, chapter)
    }
}
