use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::fs;

use crate::template::UrlTemplate;

/// Host description read from the JSON configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Base host/path substituted into the `{url}` slot.
    pub url: String,
    /// Page URL format, e.g. `{url}/{chapter}/{page}.jpg`.
    pub format: String,
    /// Index of the first page of a chapter.
    #[serde(default = "default_first_page")]
    pub first_page: u32,
}

fn default_first_page() -> u32 {
    1
}

impl SiteConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;

        Self::from_json(&data)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn template(&self) -> Result<UrlTemplate> {
        UrlTemplate::parse(&self.format)
            .map_err(|e| anyhow!("Invalid page format \"{}\": {}", self.format, e))
    }
}
