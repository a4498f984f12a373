use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use tracing::debug;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// HTTP connection context for a single chapter.
///
/// Probes and downloads of one chapter share its connection pool. A new
/// session is opened for every chapter; there is intentionally no shared
/// default instance.
pub struct ChapterSession {
    chapter: u32,
    client: Client,
}

impl ChapterSession {
    pub fn open(chapter: u32, timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        debug!(chapter, ?timeout, "Opened chapter session");
        Ok(Self { chapter, client })
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}
