// End-to-end tests against an in-process image host.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use manga2pdf::{
    ChapterOutcome, ChapterSession, DownloadOptions, Downloader, Fetcher, HttpFetcher, HttpProber,
    PageUrl, Prober, SiteConfig,
};

const CHAPTER: u32 = 5;

#[derive(Clone, Default)]
struct Site {
    pages: Arc<HashSet<u32>>,
    slow_head: Option<u32>,
    broken_get: Option<u32>,
    gets: Arc<AtomicUsize>,
}

impl Site {
    fn with_pages(pages: &[u32]) -> Self {
        Self {
            pages: Arc::new(pages.iter().copied().collect()),
            ..Default::default()
        }
    }

    fn page(&self, chapter: u32, file: &str) -> Option<u32> {
        let index = file.strip_suffix(".png")?.parse().ok()?;
        (chapter == CHAPTER && self.pages.contains(&index)).then_some(index)
    }
}

/// Page `n` is a `(10 + n) x 20` PNG so the PDF page order can be checked.
fn png_bytes(index: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(10 + index, 20, Rgb([0, 0, 255])))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

async fn head_page(
    State(site): State<Site>,
    UrlPath((chapter, file)): UrlPath<(u32, String)>,
) -> StatusCode {
    match site.page(chapter, &file) {
        Some(index) => {
            if site.slow_head == Some(index) {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn get_page(
    State(site): State<Site>,
    UrlPath((chapter, file)): UrlPath<(u32, String)>,
) -> Response {
    site.gets.fetch_add(1, Ordering::SeqCst);
    match site.page(chapter, &file) {
        Some(index) if site.broken_get == Some(index) => {
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Some(index) => ([(header::CONTENT_TYPE, "image/png")], png_bytes(index)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve(site: Site) -> String {
    let app = Router::new()
        .route("/manga/:chapter/:file", get(get_page).head(head_page))
        .with_state(site);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://127.0.0.1:{}", port)
}

fn site_config(base: &str) -> SiteConfig {
    SiteConfig {
        url: base.to_string(),
        format: "{url}/manga/{chapter}/{page}.png".to_string(),
        first_page: 1,
    }
}

fn page_widths(path: &Path) -> Vec<i64> {
    let document = lopdf::Document::load(path).unwrap();
    document
        .get_pages()
        .values()
        .map(|page_id| {
            let page = document.get_object(*page_id).unwrap().as_dict().unwrap();
            page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                .as_i64()
                .unwrap()
        })
        .collect()
}

#[tokio::test]
async fn saves_every_page_until_the_first_missing_one() {
    let site = Site::with_pages(&[1, 2, 3, 5]);
    let gets = site.gets.clone();
    let base = serve(site).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("chapter.pdf");
    let downloader = Downloader::new(output.clone(), DownloadOptions::default());

    let outcome = downloader
        .run(&site_config(&base), CHAPTER, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ChapterOutcome::Saved {
            pages: 3,
            output: output.clone(),
        }
    );
    assert_eq!(gets.load(Ordering::SeqCst), 3);
    assert_eq!(page_widths(&output), vec![11, 12, 13]);
}

#[tokio::test]
async fn missing_chapter_writes_nothing() {
    let site = Site::with_pages(&[2, 3]);
    let gets = site.gets.clone();
    let base = serve(site).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("chapter.pdf");
    let downloader = Downloader::new(output.clone(), DownloadOptions::default());

    let outcome = downloader
        .run(&site_config(&base), CHAPTER, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ChapterOutcome::NotFound);
    assert_eq!(gets.load(Ordering::SeqCst), 0);
    assert!(!output.exists());
}

#[tokio::test]
async fn probe_timeout_ends_the_chapter() {
    let site = Site {
        slow_head: Some(2),
        ..Site::with_pages(&[1, 2, 3])
    };
    let base = serve(site).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("chapter.pdf");
    let options = DownloadOptions {
        timeout: Duration::from_millis(300),
        ..Default::default()
    };
    let downloader = Downloader::new(output.clone(), options);

    let outcome = downloader
        .run(&site_config(&base), CHAPTER, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, ChapterOutcome::Saved { pages: 1, .. }));
    assert_eq!(page_widths(&output), vec![11]);
}

#[tokio::test]
async fn download_failure_after_probe_is_fatal() {
    let site = Site {
        broken_get: Some(2),
        ..Site::with_pages(&[1, 2, 3])
    };
    let base = serve(site).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("chapter.pdf");
    let downloader = Downloader::new(output.clone(), DownloadOptions::default());

    let err = downloader
        .run(&site_config(&base), CHAPTER, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("/manga/5/2.png"));
    assert!(!output.exists());
}

#[tokio::test]
async fn prober_only_accepts_ok() {
    let base = serve(Site::with_pages(&[1])).await;
    let session = ChapterSession::open(CHAPTER, Duration::from_secs(5)).unwrap();
    let prober = HttpProber::new(&session);

    assert!(prober.exists(&format!("{}/manga/5/1.png", base)).await);
    assert!(!prober.exists(&format!("{}/manga/5/2.png", base)).await);
    assert!(!prober.exists(&format!("{}/nowhere", base)).await);
}

#[tokio::test]
async fn prober_treats_refused_connection_as_missing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let session = ChapterSession::open(CHAPTER, Duration::from_secs(5)).unwrap();
    let prober = HttpProber::new(&session);

    assert!(!prober.exists(&format!("http://127.0.0.1:{}/1.png", port)).await);
}

#[tokio::test]
async fn fetcher_streams_page_to_disk() {
    let base = serve(Site::with_pages(&[4])).await;
    let session = ChapterSession::open(CHAPTER, Duration::from_secs(5)).unwrap();
    let fetcher = HttpFetcher::new(&session);
    let dir = tempfile::tempdir().unwrap();

    let page = PageUrl {
        index: 4,
        url: format!("{}/manga/5/4.png", base),
    };
    let path = fetcher.fetch(&page, dir.path()).await.unwrap();

    assert_eq!(path, dir.path().join("0004_4.png"));
    assert_eq!(std::fs::read(&path).unwrap(), png_bytes(4));

    let missing = PageUrl {
        index: 9,
        url: format!("{}/manga/5/9.png", base),
    };
    assert!(fetcher.fetch(&missing, dir.path()).await.is_err());
}
