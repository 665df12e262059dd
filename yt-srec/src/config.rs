//! Environment-driven application configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::downloader::{Quality, RetryConfig};
use crate::logging::{LogFormat, LoggingOptions};
use crate::monitor::PollerConfig;
use crate::recorder::RecorderConfig;
use crate::{Error, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub poll_interval: Duration,
    pub channel_ids: Vec<String>,
    pub recording_root: PathBuf,
    pub quality: Quality,
    pub segment_secs: u64,
    pub max_retries: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
    pub ffmpeg_path: String,
    pub ytdlp_path: String,
    pub chat_command: Option<String>,
    pub terminate_on_stop: bool,
}

/// Split a channel list on commas and whitespace, dropping empties.
pub fn parse_channel_ids(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::config(format!("{} must be a boolean, got {:?}", key, other))),
    }
}

impl AppConfig {
    /// Load from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(v) => v.trim().parse::<u64>().map_err(|e| {
                    Error::config(format!("{} must be a non-negative integer: {}", key, e))
                }),
                None => Ok(default),
            }
        };

        let max_retries = u32::try_from(number("RESTART_MAX_RETRIES", 10)?)
            .map_err(|_| Error::config("RESTART_MAX_RETRIES is too large"))?;

        let config = Self {
            api_key: get("API_KEY").or_else(|| get("YOUTUBE_API_KEY")),
            poll_interval: Duration::from_secs(number("POLL_INTERVAL_SEC", 30)?),
            channel_ids: parse_channel_ids(
                &get("CHANNEL_IDS").unwrap_or_else(|| "@FRANCE24".to_string()),
            ),
            recording_root: PathBuf::from(
                get("RECORDING_ROOT").unwrap_or_else(|| "data/recordings".to_string()),
            ),
            quality: Quality::from_str(&get("VIDEO_QUALITY").unwrap_or_else(|| "best".into()))?,
            segment_secs: number("SEGMENT_TIME_SEC", 300)?,
            max_retries,
            backoff_initial: Duration::from_secs(number("RESTART_BACKOFF_INITIAL_SEC", 3)?),
            backoff_max: Duration::from_secs(number("RESTART_BACKOFF_MAX_SEC", 60)?),
            log_format: LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "plain".into()))?,
            log_dir: get("LOG_DIR").map(PathBuf::from),
            ffmpeg_path: get("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ytdlp_path: get("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            chat_command: get("CHAT_COMMAND"),
            terminate_on_stop: match get("TERMINATE_ON_STOP") {
                Some(v) => parse_bool("TERMINATE_ON_STOP", &v)?,
                None => false,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::config("POLL_INTERVAL_SEC must be positive"));
        }
        if self.segment_secs == 0 {
            return Err(Error::config("SEGMENT_TIME_SEC must be positive"));
        }
        if self.backoff_initial.is_zero() {
            return Err(Error::config("RESTART_BACKOFF_INITIAL_SEC must be positive"));
        }
        if self.backoff_initial > self.backoff_max {
            return Err(Error::config(
                "RESTART_BACKOFF_INITIAL_SEC must not exceed RESTART_BACKOFF_MAX_SEC",
            ));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: self.backoff_initial,
            max_backoff: self.backoff_max,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            channels: self.channel_ids.clone(),
            interval: self.poll_interval,
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            output_root: self.recording_root.clone(),
            quality: self.quality,
            segment_secs: self.segment_secs,
            retry: self.retry_config(),
            terminate_on_stop: self.terminate_on_stop,
            ..Default::default()
        }
    }

    pub fn logging_options(&self) -> LoggingOptions {
        LoggingOptions {
            format: self.log_format,
            log_dir: self.log_dir.clone(),
            filter: None,
        }
    }
}
