//! ffdown CLI - fanfiction.net story downloader.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ffdown::book::Book;
use ffdown::cache::{BookCache, FileCacheSlot};
use ffdown::challenge::BrowserResolver;
use ffdown::config::Config;
use ffdown::console::Console;
use ffdown::download::{Downloader, RunContext, RunOutcome};
use ffdown::epub::{Encoder, EpubEncoder};
use ffdown::fetcher::{PageFetcher, ReqwestTransport};
use ffdown::utils::output_path;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Exit code used when the user interrupts the download.
const EXIT_CANCELLED: u8 = 130;

/// Download a fanfiction.net story as an EPUB.
#[derive(Parser, Debug)]
#[command(name = "ffdown")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_negates_reqs = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// URL of any chapter of the story, mobile or desktop site.
    #[arg(required = true)]
    story_url: Option<String>,

    /// Config file to use instead of the default one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory to write the EPUB to.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Show the browser window while passing the bot check.
    #[arg(long)]
    visible: bool,

    /// Log debug details to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write an EPUB from a saved book record without downloading anything.
    Convert {
        /// Book JSON to convert. Defaults to the snapshot of the last download.
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    ffdown::logging::init(args.verbose)?;
    let console = Console::new();

    console.section("ffdown - Story Downloader");

    console.step("Loading configuration...");
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    if args.visible {
        config.challenge.headless = false;
    }
    if let Some(directory) = args.output {
        config.output.directory = directory;
    }
    config.validate().context("Invalid configuration")?;

    let cache_path = config.cache_path().context("Failed to locate cache file")?;
    debug!(path = %cache_path.display(), "Using cache file");

    if let Some(Command::Convert { input }) = args.command {
        let input = input.unwrap_or(cache_path);
        console.step(&format!("Converting {}", input.display()));
        let (book, path) = convert(&input, &config.output.directory, &EpubEncoder::new()).await?;
        console.success(&format!(
            "Wrote \"{}\" ({} chapters) to {}",
            book.title,
            console.count(book.chapters.len()),
            path.display()
        ));
        return Ok(ExitCode::SUCCESS);
    }
    let story_url = args.story_url.context("No story URL given")?;

    let transport = ReqwestTransport::new(&config.http).context("Failed to create HTTP client")?;
    let downloader = Downloader::new(
        PageFetcher::new(Box::new(transport), &config.http),
        Box::new(BrowserResolver::new(config.challenge.clone())),
        BookCache::new(Box::new(FileCacheSlot::new(cache_path))),
        Box::new(EpubEncoder::new()),
        Box::new(Console::new()),
    );

    let ctx = Arc::new(RunContext::new());
    let interrupt = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if handle_interrupts(tokio::signal::ctrl_c, &ctx).await {
                std::process::exit(i32::from(EXIT_CANCELLED));
            }
        })
    };

    let result = downloader.run(&story_url, &ctx).await;
    interrupt.abort();
    console.clear_line();

    let outcome = match result {
        Ok(outcome) => outcome,
        // Already shown by the downloader.
        Err(_) => return Ok(ExitCode::FAILURE),
    };

    match outcome {
        RunOutcome::Completed { book, artifact } => {
            let path = write_artifact(&config.output.directory, &book, downloader.extension(), artifact).await?;
            console.success(&format!(
                "Downloaded \"{}\" ({} chapters) to {}",
                book.title,
                console.count(book.chapters.len()),
                path.display()
            ));
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Incomplete { book, failed } => {
            let failed: Vec<String> = failed.iter().map(u32::to_string).collect();
            console.error(&format!(
                "Could not fetch chapter(s) {} of \"{}\"",
                failed.join(", "),
                book.title
            ));
            console.info(&format!(
                "{} of {} chapters are saved. Run again to retry the rest.",
                book.fetched_count(),
                book.chapters.len()
            ));
            Ok(ExitCode::FAILURE)
        }
        RunOutcome::Cancelled => {
            console.warning("Download cancelled. Progress is saved; run again to resume.");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
    }
}

/// Cancels the run on the first interrupt.
///
/// Returns true when a second interrupt arrives, meaning the user wants out
/// now rather than at the next fetch boundary.
async fn handle_interrupts<S, F>(mut interrupted: S, ctx: &RunContext) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if interrupted().await.is_err() {
        return false;
    }
    ctx.cancel();
    warn!("Interrupted, finishing the current request. Press Ctrl-C again to quit immediately");

    interrupted().await.is_ok()
}

/// Encodes a saved book record and writes it to `directory`.
async fn convert(input: &Path, directory: &Path, encoder: &dyn Encoder) -> Result<(Book, PathBuf)> {
    let raw = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let record: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", input.display()))?;
    let book: Book = serde_json::from_value(record.clone())
        .with_context(|| format!("{} is not a book record", input.display()))?;

    let artifact = encoder.encode(&record).context("Failed to encode book")?;
    let path = write_artifact(directory, &book, encoder.extension(), artifact).await?;
    Ok((book, path))
}

async fn write_artifact(directory: &Path, book: &Book, extension: &str, artifact: Vec<u8>) -> Result<PathBuf> {
    tokio::fs::create_dir_all(directory)
        .await
        .with_context(|| format!("Failed to create {}", directory.display()))?;
    let path = output_path(directory, &book.title, extension);
    tokio::fs::write(&path, artifact)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
