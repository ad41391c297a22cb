//! Archive retrieval.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;

/// Fallback file name when a URL has no usable last segment.
const FALLBACK_FILE_NAME: &str = "download.deb";

/// Retrieves a URL to a local file.
pub trait Retriever {
    fn fetch(&self, url: &str) -> Result<PathBuf>;
}

/// Downloads over HTTP(S) into a fixed directory (the run's work directory).
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    dest: PathBuf,
}

impl HttpRetriever {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }
}

impl Retriever for HttpRetriever {
    fn fetch(&self, url: &str) -> Result<PathBuf> {
        let target = self.dest.join(file_name_for(url));
        tracing::info!("Downloading {} -> {}", url, target.display());

        let response = ureq::get(url)
            .call()
            .with_context(|| format!("Failed to download {}", url))?;
        let mut file = File::create(&target)
            .with_context(|| format!("Cannot create {}", target.display()))?;
        let bytes = io::copy(&mut response.into_reader(), &mut file)
            .with_context(|| format!("Failed to write {}", target.display()))?;

        tracing::debug!("Downloaded {} bytes from {}", bytes, url);
        Ok(target)
    }
}

/// Local file name for `url`: its last path segment without query or
/// fragment.
pub fn file_name_for(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    match path.split_once('/') {
        Some((_, tail)) => tail
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .unwrap_or(FALLBACK_FILE_NAME)
            .to_string(),
        None => FALLBACK_FILE_NAME.to_string(),
    }
}
