//! # manga2pdf
//!
//! A CLI utility to fetch a manga chapter from an image host and bind it into
//! a single PDF.
//!
//! The host is described by a JSON file with a base `url` and a page `format`:
//!
//! ```json
//! { "url": "https://images.example.com", "format": "{url}/{chapter}/{page:03}.jpg" }
//! ```
//!
//! Pages are discovered by probing `page` = 1, 2, 3, ... with `HEAD` requests
//! until the first one that does not exist; every page found is downloaded and
//! appended to the PDF in order.
//!
//! ## Usage
//!
//! ```bash
//! manga2pdf site.json 42 -o chapter-42.pdf -v
//! ```

pub mod config;
mod downloader;
mod fetcher;
mod pages;
mod pdf_book;
mod prober;
mod session;
pub mod template;

pub use config::SiteConfig;
pub use downloader::{fetch_book, ChapterJob, ChapterOutcome, DownloadOptions, Downloader, GapPolicy};
pub use fetcher::{Fetcher, HttpFetcher};
pub use pages::{page_urls, PageUrl};
pub use pdf_book::{Assembler, PdfBook};
pub use prober::{HttpProber, Prober};
pub use session::ChapterSession;
pub use template::{PageTemplate, TemplateError, UrlTemplate};
