//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use yt_srec::domain::RecordingState;
use yt_srec::downloader::{
    CaptureBackend, CaptureHandle, CaptureRequest, LocatorResolver, Quality,
};
use yt_srec::monitor::LiveStatusResolver;
use yt_srec::recorder::SessionControl;
use yt_srec::{Error, Result};

/// Backend whose process exits immediately with a fixed code.
#[derive(Default)]
pub struct CrashingBackend {
    pub runs: AtomicUsize,
}

#[async_trait]
impl CaptureBackend for CrashingBackend {
    fn name(&self) -> &'static str {
        "crashing"
    }

    async fn run_capture(&self, _request: CaptureRequest) -> Result<CaptureHandle> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Some(1));
        Ok(CaptureHandle::new(rx, CancellationToken::new()))
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Backend whose processes run until terminated. Writes one segment per run,
/// numbered from the request's segment start.
#[derive(Default)]
pub struct LongRunningBackend {
    pub runs: AtomicUsize,
    pub terminations: Arc<AtomicUsize>,
}

#[async_trait]
impl CaptureBackend for LongRunningBackend {
    fn name(&self) -> &'static str {
        "long-running"
    }

    async fn run_capture(&self, request: CaptureRequest) -> Result<CaptureHandle> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let segment = format!("part_{:03}.ts", request.segment_start);
        tokio::fs::write(request.output_dir.join(segment), b"ts")
            .await
            .map_err(Error::from)?;

        let (tx, rx) = oneshot::channel();
        let terminate = CancellationToken::new();
        let token = terminate.clone();
        let terminations = self.terminations.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            terminations.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(None);
        });
        Ok(CaptureHandle::new(rx, terminate))
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Locator resolver that records when it was called.
#[derive(Default)]
pub struct RecordingLocator {
    pub calls: Mutex<Vec<(String, Instant)>>,
}

impl RecordingLocator {
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Gaps between consecutive calls, in whole seconds.
    pub fn gaps_secs(&self) -> Vec<u64> {
        let calls = self.calls.lock();
        calls
            .windows(2)
            .map(|w| (w[1].1 - w[0].1).as_secs())
            .collect()
    }
}

#[async_trait]
impl LocatorResolver for RecordingLocator {
    async fn resolve_capture_locator(&self, stream_id: &str, _quality: Quality) -> Result<String> {
        self.calls
            .lock()
            .push((stream_id.to_string(), Instant::now()));
        Ok(format!("https://cdn.example/{}/index.m3u8", stream_id))
    }
}

/// Resolver replaying one scripted observation per call.
pub struct ScriptedResolver {
    script: Mutex<VecDeque<Option<String>>>,
}

impl ScriptedResolver {
    pub fn new(script: &[Option<&str>]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().map(|s| s.map(String::from)).collect()),
        })
    }
}

#[async_trait]
impl LiveStatusResolver for ScriptedResolver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn resolve_live_stream(&self, _channel_id: &str) -> Result<Option<String>> {
        Ok(self.script.lock().pop_front().flatten())
    }
}

/// Session control recording every call it receives.
#[derive(Default)]
pub struct RecordingControl {
    pub calls: Mutex<Vec<String>>,
    active: Mutex<Option<String>>,
}

impl RecordingControl {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SessionControl for RecordingControl {
    async fn start(&self, _channel_id: &str, stream_id: &str) -> Result<()> {
        self.calls.lock().push(format!("start({})", stream_id));
        let mut active = self.active.lock();
        if active.is_none() {
            *active = Some(stream_id.to_string());
        }
        Ok(())
    }

    async fn stop(&self, _channel_id: &str) -> Result<()> {
        self.calls.lock().push("stop".to_string());
        *self.active.lock() = None;
        Ok(())
    }

    fn get_state(&self, _channel_id: &str) -> RecordingState {
        if self.active.lock().is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }
}
