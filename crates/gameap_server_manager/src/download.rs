//! HTTP downloads with periodic progress lines written to the command output.

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use gameap_core::OutputWriter;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response status {0}")]
    Status(u16),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    interval: Duration,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl Downloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            interval: PROGRESS_INTERVAL,
        }
    }

    /// Streams `url` into `destination`, returning the number of bytes written.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        out: &dyn OutputWriter,
    ) -> Result<u64, DownloadError> {
        debug!(log_type = "installer", "Downloading {} to {}", url, destination.display());

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status().as_u16()));
        }

        let total = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(destination).await?;

        let started = Instant::now();
        let mut last_report = Instant::now();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if last_report.elapsed() >= self.interval {
                out.write_line(&format_progress(downloaded, total, started.elapsed()));
                last_report = Instant::now();
            }
        }

        file.flush().await?;
        out.write_line(&format_progress(downloaded, total, started.elapsed()));

        Ok(downloaded)
    }
}

fn format_progress(current: u64, total: u64, elapsed: Duration) -> String {
    let speed = match elapsed.as_secs_f64() {
        secs if secs > 0.0 => (current as f64 / secs) as u64,
        _ => 0,
    };

    let current_fmt = ByteSize::b(current).to_string_as(true);
    let speed_fmt = ByteSize::b(speed).to_string_as(true);

    if total > 0 {
        format!(
            "{}% ({} / {}) - {}/s",
            current * 100 / total,
            current_fmt,
            ByteSize::b(total).to_string_as(true),
            speed_fmt
        )
    } else {
        format!("{} downloaded - {}/s", current_fmt, speed_fmt)
    }
}
