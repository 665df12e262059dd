//! FFmpeg capture backend.

use std::process::Stdio;

use async_trait::async_trait;
use process_utils::{spawn_process_waiter, std_command, supervised_command};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::traits::{CaptureBackend, CaptureHandle, CaptureRequest};
use crate::utils::lines::LossyLines;
use crate::{Error, Result};

/// Segment file name prefix written by ffmpeg.
pub const SEGMENT_PREFIX: &str = "part_";
/// Segment file extension written by ffmpeg.
pub const SEGMENT_SUFFIX: &str = ".ts";

/// FFmpeg-based segmenting capture backend.
pub struct FfmpegBackend {
    binary_path: String,
    /// Cached version string.
    version: Option<String>,
}

impl FfmpegBackend {
    /// Create a backend using `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    /// Create a backend using a custom binary path.
    pub fn with_binary(binary_path: impl Into<String>) -> Self {
        let binary_path = binary_path.into();
        let version = Self::detect_version(&binary_path);
        Self {
            binary_path,
            version,
        }
    }

    fn detect_version(path: &str) -> Option<String> {
        std_command(path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| {
                String::from_utf8(output.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.to_string()))
            })
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Render headers the way ffmpeg's `-headers` option expects them.
    fn header_block(headers: &[(String, String)]) -> String {
        headers
            .iter()
            .map(|(k, v)| format!("{}: {}\r\n", k, v))
            .collect()
    }

    /// Build ffmpeg command arguments.
    pub(crate) fn build_args(request: &CaptureRequest) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "warning", "-y"]
            .into_iter()
            .map(String::from)
            .collect();

        if !request.headers.is_empty() {
            args.extend(["-headers".to_string(), Self::header_block(&request.headers)]);
        }

        args.extend(["-i".to_string(), request.locator.clone()]);
        args.extend(["-c".to_string(), "copy".to_string()]);
        args.extend([
            "-f".to_string(),
            "segment".to_string(),
            "-segment_time".to_string(),
            request.segment_secs.to_string(),
            "-segment_start_number".to_string(),
            request.segment_start.to_string(),
            "-reset_timestamps".to_string(),
            "1".to_string(),
        ]);

        let pattern = request
            .output_dir
            .join(format!("{}%03d{}", SEGMENT_PREFIX, SEGMENT_SUFFIX));
        args.push(pattern.to_string_lossy().to_string());

        args
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn run_capture(&self, request: CaptureRequest) -> Result<CaptureHandle> {
        let args = Self::build_args(&request);

        info!(
            channel_id = %request.channel_id,
            output_dir = %request.output_dir.display(),
            "Starting ffmpeg capture"
        );
        debug!(channel_id = %request.channel_id, "ffmpeg args: {:?}", args);

        let mut child = supervised_command(&self.binary_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::unavailable(format!("ffmpeg not found at {}", self.binary_path))
                }
                _ => Error::transient(format!("Failed to spawn ffmpeg: {}", e)),
            })?;

        if let Some(stderr) = child.stderr.take() {
            let channel_id = request.channel_id.clone();
            tokio::spawn(async move {
                // keep draining until EOF, ffmpeg dies on SIGPIPE otherwise
                let mut lines = LossyLines::new(BufReader::new(stderr));
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) if line.trim().is_empty() => {}
                        Ok(Some(line)) => warn!(channel_id = %channel_id, "ffmpeg: {}", line),
                        Ok(None) => break,
                        Err(e) => {
                            debug!(channel_id = %channel_id, "ffmpeg stderr read failed: {}", e);
                            break;
                        }
                    }
                }
            });
        }

        let terminate = CancellationToken::new();
        let exit_rx = spawn_process_waiter(
            child,
            terminate.clone(),
            format!("ffmpeg[{}]", request.channel_id),
        );

        Ok(CaptureHandle::new(exit_rx, terminate))
    }

    fn is_available(&self) -> bool {
        self.version.is_some()
    }

    fn segment_pattern(&self) -> (&'static str, &'static str) {
        (SEGMENT_PREFIX, SEGMENT_SUFFIX)
    }
}
