//! Story page parsing.
//!
//! The desktop page carries the full story header and the chapter list; the
//! mobile page only the chapter body. Both are parsed here, picked by
//! [`PageVariant`].

use crate::book::{Author, Book, Chapter, Metadata};
use crate::error::ExtractError;
use crate::fetcher::Page;
use crate::site::{DESKTOP_HOST, PageVariant, StoryRef};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

/// Attribute carrying an epoch timestamp on the story header.
const TIMESTAMP_ATTR: &str = "data-xutime";

/// An item of the form `Key: value`.
static NAMED_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]+:.+$").unwrap());

/// CSS selectors used for parsing.
struct Selectors {
    title: Selector,
    blurb: Selector,
    author: Selector,
    timestamps: Selector,
    metadata_line: Selector,
    category: Selector,
    chapter_select: Selector,
    option: Selector,
    /// Chapter body on the desktop site.
    desktop_content: Selector,
    /// Chapter body on the mobile site.
    mobile_content: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            title: Selector::parse("#profile_top > b.xcontrast_txt").unwrap(),
            blurb: Selector::parse("#profile_top > div.xcontrast_txt").unwrap(),
            author: Selector::parse("#profile_top > a.xcontrast_txt").unwrap(),
            timestamps: Selector::parse("#profile_top span[data-xutime]").unwrap(),
            metadata_line: Selector::parse("#profile_top > span.xgray").unwrap(),
            category: Selector::parse("#pre_story_links .lc-left a").unwrap(),
            chapter_select: Selector::parse("#chap_select").unwrap(),
            option: Selector::parse("option").unwrap(),
            desktop_content: Selector::parse("#storytext").unwrap(),
            mobile_content: Selector::parse("#storycontent").unwrap(),
        }
    }
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(Selectors::new);

/// The ` - ` separated info line under a story's title.
///
/// Some items are labelled (`Words: 1,234`), others are only identified by
/// where they appear (language, then genre, then characters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataLine {
    items: Vec<String>,
}

impl MetadataLine {
    pub fn parse(line: &str) -> Self {
        let items = line
            .split(" - ")
            .map(|item| item.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|item| !item.is_empty())
            .collect();
        Self { items }
    }

    /// Value of the first `key: value` item.
    pub fn named(&self, key: &str) -> Option<&str> {
        self.items.iter().find_map(|item| {
            item.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix(':'))
                .map(str::trim)
        })
    }

    /// The `index`-th unlabelled item, counting from zero in page order.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.items
            .iter()
            .filter(|item| !NAMED_ITEM_REGEX.is_match(item))
            .nth(index)
            .map(String::as_str)
    }

    fn named_owned(&self, key: &str) -> Option<String> {
        self.named(key).map(str::to_string)
    }

    fn positional_owned(&self, index: usize) -> Option<String> {
        self.positional(index).map(str::to_string)
    }
}

/// Extracts the chapter body (as HTML) from either page variant.
pub fn parse_chapter(variant: PageVariant, page: &Page) -> Result<String, ExtractError> {
    let doc = Html::parse_document(&page.body);
    chapter_body(variant, &doc)
}

fn chapter_body(variant: PageVariant, doc: &Html) -> Result<String, ExtractError> {
    let (selector, name) = match variant {
        PageVariant::Desktop => (&SELECTORS.desktop_content, "#storytext"),
        PageVariant::Mobile => (&SELECTORS.mobile_content, "#storycontent"),
    };

    doc.select(selector)
        .next()
        .map(|elem| elem.inner_html())
        .ok_or_else(|| ExtractError::ElementNotFound(name.to_string()))
}

/// Builds a fresh book from a desktop story page.
///
/// The chapter currently shown on the page gets its contents filled in so it
/// doesn't have to be fetched again.
pub fn parse_overview(page: &Page, story: &StoryRef, download_time: i64) -> Result<Book, ExtractError> {
    let doc = Html::parse_document(&page.body);

    let title = required_text(&doc, &SELECTORS.title, "story title")?;
    let blurb = required_text(&doc, &SELECTORS.blurb, "story summary")?;
    let author = extract_author(&doc, page, story)?;
    let (created_time, updated_time) = extract_timestamps(&doc)?;
    let metadata = extract_metadata(&doc);
    let chapters = extract_chapters(&doc, story)?;

    Ok(Book {
        id: story.id.clone(),
        source: story.desktop_url(None),
        title,
        blurb,
        author,
        metadata,
        updated_time,
        created_time,
        download_time,
        chapters,
    })
}

fn element_text(elem: ElementRef) -> String {
    elem.text().collect::<String>().trim().to_string()
}

fn required_text(doc: &Html, selector: &Selector, what: &str) -> Result<String, ExtractError> {
    doc.select(selector)
        .next()
        .map(element_text)
        .ok_or_else(|| ExtractError::ElementNotFound(what.to_string()))
}

fn extract_author(doc: &Html, page: &Page, story: &StoryRef) -> Result<Author, ExtractError> {
    let link = doc
        .select(&SELECTORS.author)
        .next()
        .ok_or_else(|| ExtractError::ElementNotFound("author link".to_string()))?;

    let href = link.value().attr("href").unwrap_or_default();
    let invalid = || ExtractError::InvalidAttribute {
        name: "author href".to_string(),
        value: href.to_string(),
    };

    // The page may come from the mobile host; profile links always point at the desktop one.
    let mut url = url::Url::parse(&page.url)
        .or_else(|_| url::Url::parse(&story.desktop_url(None)))
        .and_then(|base| base.join(href))
        .map_err(|_| invalid())?;
    url.set_host(Some(DESKTOP_HOST)).map_err(|_| invalid())?;

    Ok(Author {
        name: element_text(link),
        link: url.to_string(),
    })
}

/// Returns `(created, updated)`.
///
/// A story that was never revised shows only its publication time. When both
/// are shown the update comes first.
fn extract_timestamps(doc: &Html) -> Result<(i64, Option<i64>), ExtractError> {
    let stamps = doc
        .select(&SELECTORS.timestamps)
        .filter_map(|elem| elem.value().attr(TIMESTAMP_ATTR))
        .map(|raw| {
            raw.trim().parse::<i64>().map_err(|_| ExtractError::InvalidAttribute {
                name: TIMESTAMP_ATTR.to_string(),
                value: raw.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    match stamps.as_slice() {
        [] => Err(ExtractError::MissingTimestamp),
        [published] => Ok((*published, None)),
        [updated, published, ..] => Ok((*published, Some(*updated))),
    }
}

fn extract_metadata(doc: &Html) -> Metadata {
    let category = doc.select(&SELECTORS.category).map(element_text).collect();

    let line = doc
        .select(&SELECTORS.metadata_line)
        .next()
        .map(|elem| MetadataLine::parse(&elem.text().collect::<String>()))
        .unwrap_or_else(|| MetadataLine::parse(""));

    Metadata {
        category,
        rating: line.named_owned("Rated"),
        language: line.positional_owned(0),
        genre: line.positional_owned(1),
        characters: line.positional_owned(2),
        chapters: line.named_owned("Chapters"),
        words: line.named_owned("Words"),
        status: line.named_owned("Status"),
        reviews: line.named_owned("Reviews"),
        favs: line.named_owned("Favs"),
        follows: line.named_owned("Follows"),
    }
}

fn extract_chapters(doc: &Html, story: &StoryRef) -> Result<Vec<Chapter>, ExtractError> {
    // The page repeats the selector at the bottom with the same id; only the first counts.
    let Some(select) = doc.select(&SELECTORS.chapter_select).next() else {
        debug!(story = %story.id, "No chapter selector, treating as a one-shot");
        let mut chapter = Chapter::new(1, "", story.desktop_url(Some(1)));
        fill_from_page(doc, &mut chapter);
        return Ok(vec![chapter]);
    };

    let options: Vec<ElementRef> = select.select(&SELECTORS.option).collect();
    let current = options
        .iter()
        .find(|opt| opt.value().attr("selected").is_some())
        .or_else(|| options.first())
        .and_then(|opt| opt.value().attr("value"))
        .and_then(|value| value.trim().parse::<u32>().ok());

    let mut chapters = Vec::with_capacity(options.len());
    for option in options {
        let value = option.value().attr("value").unwrap_or_default().trim();
        let num = value
            .parse::<u32>()
            .map_err(|_| ExtractError::InvalidAttribute {
                name: "chapter option value".to_string(),
                value: value.to_string(),
            })?;

        let text = element_text(option);
        let title = text
            .strip_prefix(&format!("{}.", value))
            .map(|rest| rest.trim().to_string())
            .unwrap_or(text);

        let mut chapter = Chapter::new(num, title, story.desktop_url(Some(num)));
        if current == Some(num) {
            fill_from_page(doc, &mut chapter);
        }
        chapters.push(chapter);
    }

    Ok(chapters)
}

fn fill_from_page(doc: &Html, chapter: &mut Chapter) {
    match chapter_body(PageVariant::Desktop, doc) {
        Ok(contents) => chapter.set_contents(contents),
        Err(e) => debug!(chapter = chapter.num, "Current chapter not on page: {}", e),
    }
}
