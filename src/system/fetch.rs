//! Remote content download

use anyhow::{Context, Result};
use declarative::Fetcher;
use std::fs;

/// Largest body accepted from a download
const MAX_BODY_SIZE: u64 = 512 * 1024 * 1024;

/// Fetches `http(s)://` URLs with ureq and `file://` URLs from disk
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            return fs::read(path).with_context(|| format!("Failed to read {path}"));
        }

        log::debug!("Downloading {url}");
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", concat!("warren/", env!("CARGO_PKG_VERSION")))
            .call()
            .with_context(|| format!("Request failed: {url}"))?;

        let bytes = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .with_context(|| format!("Download failed: {url}"))?;

        log::debug!("Downloaded {} bytes from {url}", bytes.len());
        Ok(bytes)
    }
}
