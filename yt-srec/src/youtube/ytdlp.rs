//! `yt-dlp` based live-status scraping and capture locator resolution.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{output_with_timeout, std_command, tokio_command};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{channel_live_url, watch_url};
use crate::downloader::{
    LocatorResolver, Quality, StreamFormat, available_heights, select_hls_format,
};
use crate::monitor::LiveStatusResolver;
use crate::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Flat-playlist view of a channel's `/live` page.
#[derive(Debug, Deserialize)]
struct FlatInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    webpage_url_basename: Option<String>,
    live_status: Option<String>,
    entries: Option<Vec<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
}

/// Full metadata of one video, including its formats.
#[derive(Debug, Deserialize)]
pub struct VideoInfo {
    pub id: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub formats: Vec<StreamFormat>,
    pub live_status: Option<String>,
}

impl VideoInfo {
    /// Locator for `quality`: the best fitting HLS variant, or the top-level
    /// url when no HLS variant exists.
    pub fn capture_locator(&self, quality: Quality) -> Option<&str> {
        select_hls_format(&self.formats, quality)
            .and_then(|f| f.url.as_deref())
            .or(self.url.as_deref())
    }

    pub fn heights(&self) -> Vec<u32> {
        available_heights(&self.formats)
    }
}

fn parse_live_id(info: &FlatInfo) -> Option<String> {
    if let Some(status) = info.live_status.as_deref()
        && status != "is_live"
    {
        return None;
    }

    if info.kind.as_deref() == Some("url")
        && let Some(id) = &info.id
    {
        return Some(id.clone());
    }

    if info.webpage_url_basename.as_deref() == Some("watch")
        && let Some(id) = &info.id
    {
        return Some(id.clone());
    }

    info.entries
        .as_ref()
        .and_then(|entries| entries.iter().find_map(|e| e.id.clone()))
}

/// Wrapper around the `yt-dlp` binary.
pub struct YtDlp {
    binary_path: String,
    timeout: Duration,
    version: Option<String>,
}

impl YtDlp {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    pub fn with_binary(binary_path: impl Into<String>) -> Self {
        let binary_path = binary_path.into();
        let version = std_command(&binary_path)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| String::from_utf8(output.stdout).ok())
            .map(|s| s.trim().to_string());
        Self {
            binary_path,
            timeout: DEFAULT_TIMEOUT,
            version,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Run yt-dlp and return stdout, or `None` on a non-zero exit.
    async fn run_json(&self, args: &[&str], url: &str) -> Result<Option<String>> {
        let mut cmd = tokio_command(&self.binary_path);
        cmd.args(args).arg(url);

        let output = output_with_timeout(cmd, self.timeout)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::unavailable(format!("yt-dlp not found at {}", self.binary_path))
                }
                _ => Error::transient(format!("yt-dlp failed for {}: {}", url, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(url = %url, "yt-dlp exited with {}: {}", output.status, stderr.trim());
            return Ok(None);
        }

        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    /// Fetch full metadata of `stream_id`.
    pub async fn fetch_video_info(&self, stream_id: &str) -> Result<VideoInfo> {
        let url = watch_url(stream_id);
        let body = self
            .run_json(&["-J", "--skip-download", "--no-warnings"], &url)
            .await?
            .ok_or_else(|| Error::transient(format!("yt-dlp could not extract {}", url)))?;

        serde_json::from_str(&body)
            .map_err(|e| Error::transient(format!("Unparseable yt-dlp output for {}: {}", url, e)))
    }

    /// Available HLS heights of `stream_id`, tallest first.
    pub async fn list_heights(&self, stream_id: &str) -> Result<Vec<u32>> {
        Ok(self.fetch_video_info(stream_id).await?.heights())
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveStatusResolver for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve_live_stream(&self, channel_id: &str) -> Result<Option<String>> {
        let url = channel_live_url(channel_id);
        let Some(body) = self
            .run_json(&["--flat-playlist", "--dump-single-json", "--no-warnings"], &url)
            .await?
        else {
            return Ok(None);
        };

        let info: FlatInfo = serde_json::from_str(&body)
            .map_err(|e| Error::transient(format!("Unparseable yt-dlp output for {}: {}", url, e)))?;
        Ok(parse_live_id(&info))
    }
}

#[async_trait]
impl LocatorResolver for YtDlp {
    async fn resolve_capture_locator(&self, stream_id: &str, quality: Quality) -> Result<String> {
        let info = self.fetch_video_info(stream_id).await?;
        match info.capture_locator(quality) {
            Some(locator) => Ok(locator.to_string()),
            None => {
                warn!(stream_id = %stream_id, "No playable locator found");
                Err(Error::transient(format!(
                    "No playable locator for stream {}",
                    stream_id
                )))
            }
        }
    }

    fn is_available(&self) -> bool {
        self.version.is_some()
    }
}
