use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use colored::*;
use futures_util::{pin_mut, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SiteConfig;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::pages::page_urls;
use crate::pdf_book::{Assembler, PdfBook};
use crate::prober::{HttpProber, Prober};
use crate::session::ChapterSession;
use crate::template::PageTemplate;

/// What to do when the chapter ends at a missing page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GapPolicy {
    /// The first missing page ends the chapter.
    #[default]
    Truncate,
    /// Probe up to `lookahead` pages past the missing one and fail the
    /// chapter if any of them exists.
    Abort { lookahead: u32 },
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Per-request timeout; zero disables it.
    pub timeout: Duration,
    pub gap_policy: GapPolicy,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            gap_policy: GapPolicy::Truncate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    /// The first page does not exist; nothing was downloaded or written.
    NotFound,
    Saved { pages: usize, output: PathBuf },
    /// Stopped on request after `fetched` pages; nothing was written.
    Cancelled { fetched: usize },
}

/// Everything one chapter run needs besides its collaborators.
pub struct ChapterJob<'a> {
    pub chapter: u32,
    pub template: &'a PageTemplate,
    pub first_page: u32,
    pub workdir: &'a Path,
    pub output: &'a Path,
    pub gap_policy: GapPolicy,
}

pub struct Downloader {
    output: PathBuf,
    options: DownloadOptions,
}

impl Downloader {
    pub fn new(output: PathBuf, options: DownloadOptions) -> Self {
        Self { output, options }
    }

    /// Fetches `chapter` of the configured host into the output PDF.
    pub async fn run(
        &self,
        config: &SiteConfig,
        chapter: u32,
        cancel: &CancellationToken,
    ) -> Result<ChapterOutcome> {
        info!(
            "Fetching chapter {} from \"{}\"",
            chapter.to_string().green(),
            config.url.green()
        );

        let template = config.template()?.bind_chapter(&config.url, chapter);
        debug!("Page template for chapter {}: {}", chapter, template);

        let workdir = tempfile::Builder::new()
            .prefix("manga2pdf-")
            .tempdir()
            .map_err(|e| anyhow!("Failed to create working directory: {}", e))?;

        let job = ChapterJob {
            chapter,
            template: &template,
            first_page: config.first_page,
            workdir: workdir.path(),
            output: &self.output,
            gap_policy: self.options.gap_policy,
        };
        let result = self.run_internal(&job, cancel).await;

        let workdir_path = workdir.path().to_path_buf();
        if let Err(e) = workdir.close() {
            warn!("Failed to remove {}: {}", workdir_path.display(), e);
        }

        result
    }

    async fn run_internal(
        &self,
        job: &ChapterJob<'_>,
        cancel: &CancellationToken,
    ) -> Result<ChapterOutcome> {
        let session = ChapterSession::open(job.chapter, self.options.timeout)?;
        let prober = HttpProber::new(&session);
        let fetcher = HttpFetcher::new(&session);
        let mut book = PdfBook::new();

        fetch_book(job, &prober, &fetcher, &mut book, cancel).await
    }
}

/// Runs one chapter: probe the first page, stream and fetch every page in
/// order, then assemble them into `job.output`.
pub async fn fetch_book<P, F, A>(
    job: &ChapterJob<'_>,
    prober: &P,
    fetcher: &F,
    assembler: &mut A,
    cancel: &CancellationToken,
) -> Result<ChapterOutcome>
where
    P: Prober + ?Sized,
    F: Fetcher + ?Sized,
    A: Assembler + ?Sized,
{
    let first_url = job.template.bind_page(job.first_page);
    let first_exists = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Ok(cancelled(job, 0));
        }
        exists = prober.exists(&first_url) => exists,
    };
    if !first_exists {
        info!(
            "Couldn't fetch the first page of chapter {} ({})",
            job.chapter, first_url
        );
        return Ok(ChapterOutcome::NotFound);
    }

    let pages = page_urls(job.template, job.first_page, prober);
    pin_mut!(pages);

    let mut missing = Some(job.first_page);
    loop {
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(cancelled(job, assembler.page_count()));
            }
            page = pages.next() => page,
        };
        let Some(page) = page else {
            break;
        };

        let path = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(cancelled(job, assembler.page_count()));
            }
            path = fetcher.fetch(&page, job.workdir) => path?,
        };
        assembler.add_page(&path).await?;
        missing = page.index.checked_add(1);
    }

    if let (GapPolicy::Abort { lookahead }, Some(missing)) = (job.gap_policy, missing) {
        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(cancelled(job, assembler.page_count()));
            }
            found = page_after_gap(job.template, missing, lookahead, prober) => found,
        };
        if let Some(found) = found {
            return Err(anyhow!(
                "Page {} of chapter {} is missing but page {} exists",
                missing,
                job.chapter,
                found
            ));
        }
    }

    if cancel.is_cancelled() {
        return Ok(cancelled(job, assembler.page_count()));
    }

    let page_count = assembler.page_count();
    info!(
        "Saving {} pages of chapter {} to PDF ({})",
        page_count,
        job.chapter,
        job.output.display().to_string().blue()
    );
    assembler.save(job.output).await?;

    Ok(ChapterOutcome::Saved {
        pages: page_count,
        output: job.output.to_path_buf(),
    })
}

fn cancelled(job: &ChapterJob<'_>, fetched: usize) -> ChapterOutcome {
    warn!(
        "Chapter {} cancelled after {} pages, nothing saved",
        job.chapter, fetched
    );
    ChapterOutcome::Cancelled { fetched }
}

async fn page_after_gap<P>(
    template: &PageTemplate,
    missing: u32,
    lookahead: u32,
    prober: &P,
) -> Option<u32>
where
    P: Prober + ?Sized,
{
    for offset in 1..=lookahead {
        let index = missing.checked_add(offset)?;
        if prober.exists(&template.bind_page(index)).await {
            return Some(index);
        }
    }
    None
}
