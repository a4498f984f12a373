use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::session::ChapterSession;

/// Answers whether a page URL exists, without fetching its body.
///
/// This is a predicate: absence and transport failures both yield `false`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn exists(&self, url: &str) -> bool;
}

/// `HEAD`-based prober bound to one chapter session.
pub struct HttpProber<'s> {
    session: &'s ChapterSession,
}

impl<'s> HttpProber<'s> {
    pub fn new(session: &'s ChapterSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Prober for HttpProber<'_> {
    async fn exists(&self, url: &str) -> bool {
        match self.session.client().head(url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(chapter = self.session.chapter(), %status, "HEAD {}", url);
                status == StatusCode::OK
            }
            Err(e) if e.is_timeout() => {
                warn!("Timed out probing {}, treating it as missing", url);
                false
            }
            Err(e) => {
                warn!("Failed to probe {}: {}", url, e);
                false
            }
        }
    }
}
