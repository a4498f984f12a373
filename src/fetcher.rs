use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::pages::PageUrl;
use crate::session::ChapterSession;

/// Downloads a confirmed page into a working directory.
///
/// Unlike probing, a failure here is a real error: the page was seen to exist.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, page: &PageUrl, dir: &Path) -> Result<PathBuf>;
}

pub struct HttpFetcher<'s> {
    session: &'s ChapterSession,
}

impl<'s> HttpFetcher<'s> {
    pub fn new(session: &'s ChapterSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher<'_> {
    async fn fetch(&self, page: &PageUrl, dir: &Path) -> Result<PathBuf> {
        info!("Downloading page {} from {}", page.index, page.url);

        let response = self
            .session
            .client()
            .get(&page.url)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to download {}: {}", page.url, e))?
            .error_for_status()
            .map_err(|e| anyhow!("Failed to download {}: {}", page.url, e))?;

        let path = dir.join(local_file_name(page));
        let mut file = File::create(&path)
            .await
            .map_err(|e| anyhow!("Failed to create {}: {}", path.display(), e))?;

        let mut written = 0usize;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| anyhow!("Failed to read body of {}: {}", page.url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!("Saved {} bytes of page {} to {}", written, page.index, path.display());
        Ok(path)
    }
}

/// `0007_<last path segment>`; the index prefix keeps names unique and ordered.
fn local_file_name(page: &PageUrl) -> String {
    let name = Url::parse(&page.url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| "page".to_string());

    format!("{:04}_{}", page.index, name)
}
