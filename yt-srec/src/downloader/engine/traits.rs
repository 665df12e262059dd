//! Capture backend trait and related types.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Parameters of one capture backend invocation.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Directly fetchable media locator.
    pub locator: String,
    /// Directory receiving the numbered segment files.
    pub output_dir: PathBuf,
    /// Target duration of each segment in seconds.
    pub segment_secs: u64,
    /// Number of the first segment written by this invocation.
    pub segment_start: u64,
    /// Additional request headers.
    pub headers: Vec<(String, String)>,
    /// Channel the capture belongs to (for logging).
    pub channel_id: String,
}

impl CaptureRequest {
    pub fn new(
        locator: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        segment_secs: u64,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            locator: locator.into(),
            output_dir: output_dir.into(),
            segment_secs,
            segment_start: 0,
            headers: Vec::new(),
            channel_id: channel_id.into(),
        }
    }

    /// Continue numbering after segments left by an earlier invocation.
    pub fn with_segment_start(mut self, segment_start: u64) -> Self {
        self.segment_start = segment_start;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// Handle to a running capture process.
///
/// Exposes only "await completion" and "request termination"; the process
/// itself stays a black box.
#[derive(Debug)]
pub struct CaptureHandle {
    exit_rx: oneshot::Receiver<Option<i32>>,
    exit: Option<Option<i32>>,
    terminate: CancellationToken,
}

impl CaptureHandle {
    /// Wrap an exit-code receiver and the token that terminates the process.
    pub fn new(exit_rx: oneshot::Receiver<Option<i32>>, terminate: CancellationToken) -> Self {
        Self {
            exit_rx,
            exit: None,
            terminate,
        }
    }

    /// Wait for the process to exit.
    ///
    /// Returns the exit code, or `None` when the process was terminated or
    /// its waiter disappeared.
    pub async fn wait(&mut self) -> Option<i32> {
        if let Some(exit) = self.exit {
            return exit;
        }
        let exit = (&mut self.exit_rx).await.unwrap_or(None);
        self.exit = Some(exit);
        exit
    }

    /// Ask the process to terminate. Completion is still observed via [`wait`].
    ///
    /// [`wait`]: CaptureHandle::wait
    pub fn terminate(&self) {
        self.terminate.cancel();
    }
}

/// A backend producing numbered media segments on disk.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Launch a capture. Returns once the process is running.
    async fn run_capture(&self, request: CaptureRequest) -> Result<CaptureHandle>;

    /// Check if the backend can be used (e.g., binary exists).
    fn is_available(&self) -> bool;

    /// Segment file name prefix and suffix used to count produced segments.
    fn segment_pattern(&self) -> (&'static str, &'static str) {
        ("part_", ".ts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_request_builder() {
        let request = CaptureRequest::new("https://example.com/live.m3u8", "/tmp/out", 300, "UC1")
            .with_header("Referer", "https://www.youtube.com/")
            .with_headers([("Origin", "https://www.youtube.com")]);

        assert_eq!(request.segment_secs, 300);
        assert_eq!(request.segment_start, 0);
        assert_eq!(request.headers.len(), 2);
        assert_eq!(request.headers[0].0, "Referer");
        assert_eq!(request.with_segment_start(7).segment_start, 7);
    }

    #[tokio::test]
    async fn test_handle_reports_exit_code() {
        let (tx, rx) = oneshot::channel();
        let mut handle = CaptureHandle::new(rx, CancellationToken::new());
        tx.send(Some(1)).unwrap();
        assert_eq!(handle.wait().await, Some(1));
    }

    #[tokio::test]
    async fn test_handle_dropped_waiter_is_none() {
        let (tx, rx) = oneshot::channel::<Option<i32>>();
        let mut handle = CaptureHandle::new(rx, CancellationToken::new());
        drop(tx);
        assert_eq!(handle.wait().await, None);
    }

    #[test]
    fn test_terminate_cancels_token() {
        let (_tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let handle = CaptureHandle::new(rx, token.clone());
        handle.terminate();
        assert!(token.is_cancelled());
    }
}
