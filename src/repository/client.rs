// src/repository/client.rs

//! HTTP fetcher
//!
//! A thin wrapper around a blocking reqwest client with a bounded retry
//! loop and streamed writes, so cabinets of any size download without
//! buffering in memory.

use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for HTTP requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Base retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads
const STREAM_BUFFER_SIZE: usize = 8192;

/// Downloads remote artifacts to caller-provided files.
///
/// The resolver asks `recognizes` to decide whether a user-supplied path is
/// a URL at all; everything else is treated as a local filesystem path.
pub trait Fetcher {
    /// Whether this fetcher understands the scheme of `path`
    fn recognizes(&self, path: &str) -> bool;

    /// Stream `url` into `dest`, truncating any previous content
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Blocking HTTP/HTTPS fetcher with retry and optional progress display
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    max_retries: u32,
    show_progress: bool,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
            show_progress: true,
        })
    }

    /// Disable the progress bar (used by tests and scripted callers)
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    fn progress_bar(&self, size: u64, name: &str) -> Option<ProgressBar> {
        if !self.show_progress || size == 0 {
            return None;
        }
        let pb = ProgressBar::new(size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
                .expect("progress bar template is valid")
                .progress_chars("#>-"),
        );
        pb.set_message(name.to_string());
        Some(pb)
    }

    fn stream_to_file(
        mut response: reqwest::blocking::Response,
        file: &mut File,
        progress: Option<&ProgressBar>,
    ) -> Result<u64> {
        let mut downloaded = 0u64;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])
                .map_err(|e| Error::WriteFault(format!("failed to write download: {e}")))?;
            downloaded += n as u64;
            if let Some(pb) = progress {
                pb.set_position(downloaded);
            }
        }
        Ok(downloaded)
    }
}

impl Fetcher for HttpFetcher {
    fn recognizes(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let display_name = url.rsplit('/').next().unwrap_or(url).to_string();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::Network(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let total = response.content_length().unwrap_or(0);
                    let pb = self.progress_bar(total, &display_name);

                    let mut file = File::create(dest).map_err(|e| {
                        Error::WriteFault(format!("failed to create {}: {e}", dest.display()))
                    })?;
                    let downloaded = Self::stream_to_file(response, &mut file, pb.as_ref())?;
                    file.sync_all().map_err(|e| {
                        Error::WriteFault(format!("failed to sync {}: {e}", dest.display()))
                    })?;

                    if let Some(pb) = pb {
                        pb.finish_and_clear();
                    }
                    debug!("downloaded {} bytes from {}", downloaded, url);
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Network(format!(
                            "failed to fetch {url} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("fetch attempt {} for {} failed: {}, retrying", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_recognition() {
        let fetcher = HttpFetcher::new().unwrap();
        assert!(fetcher.recognizes("http://host/pkg.cab"));
        assert!(fetcher.recognizes("HTTPS://host/pkg.cab"));
        assert!(!fetcher.recognizes("/usr/local/pkg.cab"));
        assert!(!fetcher.recognizes("pkg.cab"));
        assert!(!fetcher.recognizes("ftp://host/pkg.cab"));
    }
}
