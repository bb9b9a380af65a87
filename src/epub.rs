//! EPUB output.
//!
//! The encoder receives the book in its serialized form, the same JSON that
//! goes into the cache, and returns the finished file's bytes.

use crate::book::{Book, Chapter};
use crate::error::EncodeError;
use crate::utils::{escape_html, format_epoch};
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};

/// Date format used on the title page.
const DATE_FORMAT: &str = "%Y-%m-%d";

const STYLESHEET: &str = "body { font-family: serif; line-height: 1.4; }
h1 { text-align: center; }
.blurb { font-style: italic; margin: 1em 2em; }
table.meta td { padding: 0.1em 0.6em; vertical-align: top; }
.meta-key { font-weight: bold; text-align: right; }
";

/// Turns a finished book record into a document.
pub trait Encoder: Send + Sync {
    /// File extension of the produced document, without the dot.
    fn extension(&self) -> &'static str;

    /// Encodes the serialized book.
    fn encode(&self, record: &serde_json::Value) -> Result<Vec<u8>, EncodeError>;
}

/// Encoder producing an EPUB with a title page and one file per chapter.
#[derive(Debug, Default)]
pub struct EpubEncoder;

impl EpubEncoder {
    pub fn new() -> Self {
        Self
    }

    fn build(&self, book: &Book) -> Result<Vec<u8>, EncodeError> {
        let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(epub_error)?).map_err(epub_error)?;

        builder.set_title(&book.title);
        builder.add_author(&book.author.name);
        builder.set_description(vec![book.blurb.clone()]);
        if let Some(genre) = &book.metadata.genre {
            for subject in genre.split('/') {
                builder.add_subject(subject.trim());
            }
        }

        builder
            .stylesheet(STYLESHEET.as_bytes())
            .map_err(epub_error)?
            .add_content(
                EpubContent::new("title.xhtml", title_page(book).as_bytes())
                    .title("Title")
                    .reftype(ReferenceType::TitlePage),
            )
            .map_err(epub_error)?
            .inline_toc();

        for chapter in &book.chapters {
            let contents = chapter
                .contents
                .as_deref()
                .ok_or(EncodeError::MissingChapter(chapter.num))?;
            let heading = chapter_heading(chapter, book);
            let body = format!("<h2>{}</h2>\n{}", escape_html(&heading), contents);

            builder
                .add_content(
                    EpubContent::new(format!("chapter_{}.xhtml", chapter.num), wrap_xhtml(&heading, &body).as_bytes())
                        .title(heading)
                        .reftype(ReferenceType::Text),
                )
                .map_err(epub_error)?;
        }

        let mut buffer = Vec::new();
        builder.generate(&mut buffer).map_err(epub_error)?;
        Ok(buffer)
    }
}

impl Encoder for EpubEncoder {
    fn extension(&self) -> &'static str {
        "epub"
    }

    fn encode(&self, record: &serde_json::Value) -> Result<Vec<u8>, EncodeError> {
        let book: Book = serde_json::from_value(record.clone())?;
        self.build(&book)
    }
}

fn epub_error(err: impl std::fmt::Display) -> EncodeError {
    EncodeError::Epub(err.to_string())
}

/// Table of contents entry and heading for a chapter.
fn chapter_heading(chapter: &Chapter, book: &Book) -> String {
    if book.chapters.len() == 1 && chapter.title.is_empty() {
        return book.title.clone();
    }
    if chapter.title.is_empty() {
        return format!("Chapter {}", chapter.num);
    }
    format!("Chapter {}: {}", chapter.num, chapter.title)
}

fn title_page(book: &Book) -> String {
    let meta = &book.metadata;
    let mut rows: Vec<(&str, String)> = Vec::new();

    if !meta.category.is_empty() {
        rows.push(("Category", meta.category.join(" > ")));
    }
    let optional = [
        ("Rated", &meta.rating),
        ("Language", &meta.language),
        ("Genre", &meta.genre),
        ("Characters", &meta.characters),
        ("Chapters", &meta.chapters),
        ("Words", &meta.words),
        ("Status", &meta.status),
        ("Reviews", &meta.reviews),
        ("Favs", &meta.favs),
        ("Follows", &meta.follows),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            rows.push((key, value.clone()));
        }
    }
    if let Some(published) = format_epoch(book.created_time, DATE_FORMAT) {
        rows.push(("Published", published));
    }
    if let Some(updated) = book.updated_time.and_then(|t| format_epoch(t, DATE_FORMAT)) {
        rows.push(("Updated", updated));
    }
    if let Some(downloaded) = format_epoch(book.download_time, DATE_FORMAT) {
        rows.push(("Downloaded", downloaded));
    }

    let table: String = rows
        .iter()
        .map(|(key, value)| {
            format!(
                "<tr><td class=\"meta-key\">{}</td><td>{}</td></tr>\n",
                key,
                escape_html(value)
            )
        })
        .collect();

    let body = format!(
        "<h1>{title}</h1>\n<p>by <a href=\"{author_link}\">{author}</a></p>\n\
<p class=\"blurb\">{blurb}</p>\n<table class=\"meta\">\n{table}</table>\n\
<p>Source: <a href=\"{source}\">{source}</a></p>",
        title = escape_html(&book.title),
        author_link = escape_html(&book.author.link),
        author = escape_html(&book.author.name),
        blurb = escape_html(&book.blurb),
        table = table,
        source = escape_html(&book.source),
    );

    wrap_xhtml(&book.title, &body)
}

fn wrap_xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
<meta charset="UTF-8"/>
<title>{}</title>
<link rel="stylesheet" type="text/css" href="stylesheet.css"/>
</head>
<body>
{}
</body>
</html>"#,
        escape_html(title),
        body
    )
}
