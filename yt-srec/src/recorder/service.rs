//! Recorder service.
//!
//! Owns the active recording sessions, one per channel at most, and runs a
//! supervision task per session that restarts the capture backend with
//! exponential backoff after unplanned exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::manifest::{ManifestWriter, SessionManifest};
use crate::chat::{CHAT_FILE_NAME, ChatCapture};
use crate::domain::RecordingState;
use crate::downloader::{
    CaptureBackend, CaptureRequest, LocatorResolver, Quality, RetryConfig, RetryState,
};
use crate::metrics::MetricsCollector;
use crate::utils::fs::{count_files_matching, ensure_dir_all};
use crate::youtube::BROWSER_HEADERS;
use crate::{Error, Result};

/// Start/stop contract shared by the poller and any external control surface.
#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Start recording `stream_id` on `channel_id`. No-op while a session is
    /// already active for the channel.
    async fn start(&self, channel_id: &str, stream_id: &str) -> Result<()>;

    /// Stop the active session of `channel_id`. No-op when idle.
    async fn stop(&self, channel_id: &str) -> Result<()>;

    /// Current lifecycle state; `Idle` for unknown channels.
    fn get_state(&self, channel_id: &str) -> RecordingState;
}

/// Recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Root of the `<channel>/<stream>/` session directories.
    pub output_root: PathBuf,
    pub quality: Quality,
    /// Target segment duration in seconds.
    pub segment_secs: u64,
    pub retry: RetryConfig,
    /// How often the session directory is rescanned for segments.
    pub segment_poll_interval: Duration,
    /// Also terminate the running backend process on `stop`.
    pub terminate_on_stop: bool,
    /// Request headers passed to the capture backend.
    pub headers: Vec<(String, String)>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("data/recordings"),
            quality: Quality::Best,
            segment_secs: 300,
            retry: RetryConfig::default(),
            segment_poll_interval: Duration::from_secs(5),
            terminate_on_stop: false,
            headers: BROWSER_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct SlotStatus {
    state: RecordingState,
    /// Id of the session currently owning the slot.
    session_id: Option<String>,
    stream_id: Option<String>,
}

/// Per-channel bookkeeping.
///
/// `session` is the per-channel critical section: every start/stop holds it
/// for its whole duration. `status` is a cheap synchronous mirror for reads.
#[derive(Default)]
struct ChannelSlot {
    status: RwLock<SlotStatus>,
    session: Mutex<Option<ActiveSession>>,
}

impl ChannelSlot {
    fn state(&self) -> RecordingState {
        self.status.read().state
    }

    /// Move to `state` and hand the slot to `session` (or release it).
    ///
    /// Callers hold the session lock, so ownership changes always apply; a
    /// transition outside the lifecycle table is logged.
    fn set_status(&self, state: RecordingState, session: Option<(&str, &str)>) {
        let mut status = self.status.write();
        if !status.state.can_transition_to(state) {
            warn!(from = %status.state, to = %state, "Unexpected recording state transition");
        }
        status.state = state;
        status.session_id = session.map(|(id, _)| id.to_string());
        status.stream_id = session.map(|(_, stream)| stream.to_string());
    }

    /// Change the state only if `session_id` still owns the slot and the
    /// lifecycle allows the move.
    fn set_state_if_current(&self, session_id: &str, state: RecordingState) -> bool {
        let mut status = self.status.write();
        if status.session_id.as_deref() != Some(session_id)
            || !status.state.can_transition_to(state)
        {
            return false;
        }
        status.state = state;
        true
    }
}

struct ChatTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle of one active session.
struct ActiveSession {
    id: String,
    stream_id: String,
    /// Removal from the active set; observed by the supervisor at its poll points.
    stop_token: CancellationToken,
    /// Forced termination of the running backend process.
    kill_token: CancellationToken,
    manifest: Arc<ManifestWriter>,
    chat: Option<ChatTask>,
}

impl ActiveSession {
    /// Tear down everything the session owns except the supervisor.
    ///
    /// Side-channel failures and cancellation are swallowed.
    async fn close(mut self, channel_id: &str) -> Option<SessionManifest> {
        self.stop_token.cancel();

        if let Some(chat) = self.chat.take() {
            chat.cancel.cancel();
            if let Err(e) = chat.handle.await {
                debug!(channel_id = %channel_id, "Chat task ended abnormally: {}", e);
            }
        }

        match self.manifest.finish().await {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(channel_id = %channel_id, "Failed to finalize manifest: {}", e);
                None
            }
        }
    }
}

/// Supervises recording sessions for all channels.
pub struct Recorder {
    config: Arc<RecorderConfig>,
    backend: Option<Arc<dyn CaptureBackend>>,
    locator: Option<Arc<dyn LocatorResolver>>,
    chat: Option<Arc<dyn ChatCapture>>,
    metrics: Arc<MetricsCollector>,
    channels: DashMap<String, Arc<ChannelSlot>>,
    tracker: TaskTracker,
    /// Rejects new sessions once cancelled.
    shutdown: CancellationToken,
    /// Parent of every session's kill token, including sessions already
    /// stopped whose backend is still running.
    terminate_all: CancellationToken,
}

impl Recorder {
    /// Create a recorder without collaborators; `start` fails with
    /// `BackendUnavailable` until a backend and a locator resolver are set.
    pub fn new(config: RecorderConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            config: Arc::new(config),
            backend: None,
            locator: None,
            chat: None,
            metrics,
            channels: DashMap::new(),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            terminate_all: CancellationToken::new(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_locator(mut self, locator: Arc<dyn LocatorResolver>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatCapture>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Session directory for a channel/stream pair.
    pub fn session_dir(&self, channel_id: &str, stream_id: &str) -> PathBuf {
        self.config.output_root.join(channel_id).join(stream_id)
    }

    /// Stream id of the active session, if any.
    pub fn active_stream(&self, channel_id: &str) -> Option<String> {
        self.channels
            .get(channel_id)
            .and_then(|slot| slot.status.read().stream_id.clone())
    }

    /// Channels that currently own a session.
    pub fn active_channels(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|e| e.value().status.read().session_id.is_some())
            .map(|e| e.key().clone())
            .collect()
    }

    fn slot(&self, channel_id: &str) -> Arc<ChannelSlot> {
        if let Some(slot) = self.channels.get(channel_id) {
            return slot.value().clone();
        }
        self.channels
            .entry(channel_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn collaborators(&self) -> Result<(Arc<dyn CaptureBackend>, Arc<dyn LocatorResolver>)> {
        let backend = self
            .backend
            .as_ref()
            .filter(|b| b.is_available())
            .ok_or_else(|| Error::unavailable("no capture backend available"))?;
        let locator = self
            .locator
            .as_ref()
            .filter(|l| l.is_available())
            .ok_or_else(|| Error::unavailable("no locator resolver available"))?;
        Ok((backend.clone(), locator.clone()))
    }

    fn publish_state(&self, channel_id: &str, state: RecordingState) {
        self.metrics.set_channel_state(channel_id, state);
    }

    async fn stop_session(&self, channel_id: &str, terminate: bool) -> bool {
        let Some(slot) = self.channels.get(channel_id).map(|s| s.value().clone()) else {
            return false;
        };

        let mut guard = slot.session.lock().await;
        let Some(session) = guard.take() else {
            return false;
        };

        slot.set_status(RecordingState::Stopping, None);
        self.publish_state(channel_id, RecordingState::Stopping);
        session.stop_token.cancel();
        if terminate {
            session.kill_token.cancel();
        }

        let stream_id = session.stream_id.clone();
        let manifest = session.close(channel_id).await;

        slot.set_status(RecordingState::Idle, None);
        self.publish_state(channel_id, RecordingState::Idle);
        self.metrics.record_recording_stopped();
        drop(guard);

        info!(
            channel_id = %channel_id,
            stream_id = %stream_id,
            segments = manifest.map(|m| m.segment_count).unwrap_or(0),
            terminated = terminate,
            "Recording stopped"
        );
        true
    }

    /// Stop every session with forced backend termination and wait for all
    /// supervision and chat tasks to finish. Later starts are rejected.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let channels: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        let mut stopped = 0;
        for channel_id in channels {
            if self.stop_session(&channel_id, true).await {
                stopped += 1;
            }
        }

        // backends left running by plain stops
        self.terminate_all.cancel();

        self.tracker.close();
        self.tracker.wait().await;
        info!("Recorder shut down ({} sessions stopped)", stopped);
    }
}

#[async_trait]
impl SessionControl for Recorder {
    async fn start(&self, channel_id: &str, stream_id: &str) -> Result<()> {
        let (backend, locator) = self.collaborators()?;
        let slot = self.slot(channel_id);

        let mut guard = slot.session.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(Error::Other("recorder is shutting down".to_string()));
        }
        if let Some(active) = guard.as_ref() {
            if active.stream_id != stream_id {
                warn!(
                    channel_id = %channel_id,
                    active_stream = %active.stream_id,
                    requested_stream = %stream_id,
                    "Session already active for another stream, ignoring start"
                );
            } else {
                debug!(channel_id = %channel_id, stream_id = %stream_id, "Already recording");
            }
            return Ok(());
        }

        let output_dir = self.session_dir(channel_id, stream_id);
        ensure_dir_all(&output_dir).await?;

        let manifest = Arc::new(
            ManifestWriter::create(
                ManifestWriter::path_in(&output_dir),
                SessionManifest::new(channel_id, stream_id, self.config.quality.label()),
            )
            .await?,
        );

        let session_id = Uuid::new_v4().to_string();
        let stop_token = CancellationToken::new();
        let kill_token = self.terminate_all.child_token();

        let chat = self.chat.as_ref().map(|capture| {
            let cancel = CancellationToken::new();
            let capture = capture.clone();
            let token = cancel.clone();
            let channel = channel_id.to_string();
            let stream = stream_id.to_string();
            let file = output_dir.join(CHAT_FILE_NAME);
            let handle = self.tracker.spawn(async move {
                if let Err(e) = capture.capture(&stream, &file, token).await {
                    warn!(channel_id = %channel, "Chat capture failed: {}", e);
                }
            });
            ChatTask { cancel, handle }
        });

        slot.set_status(RecordingState::Recording, Some((session_id.as_str(), stream_id)));
        self.publish_state(channel_id, RecordingState::Recording);

        let supervisor = Supervisor {
            channel_id: channel_id.to_string(),
            session_id: session_id.clone(),
            stream_id: stream_id.to_string(),
            output_dir,
            slot: slot.clone(),
            backend,
            locator,
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            manifest: manifest.clone(),
            stop_token: stop_token.clone(),
            kill_token: kill_token.clone(),
        };
        self.tracker.spawn(supervisor.run());

        *guard = Some(ActiveSession {
            id: session_id,
            stream_id: stream_id.to_string(),
            stop_token,
            kill_token,
            manifest,
            chat,
        });
        self.metrics.record_recording_started();

        info!(channel_id = %channel_id, stream_id = %stream_id, "Recording started");
        Ok(())
    }

    async fn stop(&self, channel_id: &str) -> Result<()> {
        self.stop_session(channel_id, self.config.terminate_on_stop)
            .await;
        Ok(())
    }

    fn get_state(&self, channel_id: &str) -> RecordingState {
        self.channels
            .get(channel_id)
            .map(|slot| slot.state())
            .unwrap_or_default()
    }
}

/// Crash-retry loop of one session.
struct Supervisor {
    channel_id: String,
    session_id: String,
    stream_id: String,
    output_dir: PathBuf,
    slot: Arc<ChannelSlot>,
    backend: Arc<dyn CaptureBackend>,
    locator: Arc<dyn LocatorResolver>,
    config: Arc<RecorderConfig>,
    metrics: Arc<MetricsCollector>,
    manifest: Arc<ManifestWriter>,
    stop_token: CancellationToken,
    kill_token: CancellationToken,
}

impl Supervisor {
    async fn run(self) {
        let mut retry = RetryState::new(self.config.retry.clone());

        loop {
            if self.stop_token.is_cancelled() {
                break;
            }

            let outcome = self.attempt().await;
            if self.stop_token.is_cancelled() {
                break;
            }

            match outcome {
                Ok(code) => warn!(
                    channel_id = %self.channel_id,
                    stream_id = %self.stream_id,
                    "Capture backend exited unexpectedly (code {:?})",
                    code
                ),
                Err(e) => warn!(
                    channel_id = %self.channel_id,
                    stream_id = %self.stream_id,
                    "Capture attempt failed: {}",
                    e
                ),
            }

            let Some(delay) = retry.record_failure() else {
                let err = Error::RetriesExhausted {
                    channel_id: self.channel_id.clone(),
                    attempts: retry.failures(),
                };
                error!(channel_id = %self.channel_id, "{}", err);
                self.metrics.record_retries_exhausted(&self.channel_id);
                self.abandon().await;
                return;
            };

            if self
                .slot
                .set_state_if_current(&self.session_id, RecordingState::Error)
            {
                self.metrics
                    .set_channel_state(&self.channel_id, RecordingState::Error);
            }
            self.metrics.record_restart(&self.channel_id);
            info!(
                channel_id = %self.channel_id,
                attempt = retry.failures(),
                "Retrying capture in {:?}",
                delay
            );

            tokio::select! {
                _ = self.stop_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(channel_id = %self.channel_id, "Supervisor exited");
    }

    /// One capture attempt. Returns the backend exit code.
    async fn attempt(&self) -> Result<Option<i32>> {
        let locator = self
            .locator
            .resolve_capture_locator(&self.stream_id, self.config.quality)
            .await
            .map_err(|e| match e {
                e if e.is_transient() => e,
                Error::BackendUnavailable(_) => e,
                other => Error::transient(other.to_string()),
            })?;

        // stopped while resolving
        if self.stop_token.is_cancelled() {
            return Ok(None);
        }

        // numbering continues after segments of earlier attempts
        let (prefix, suffix) = self.backend.segment_pattern();
        let segment_start = count_files_matching(&self.output_dir, prefix, suffix)
            .await
            .unwrap_or(0);

        let request = CaptureRequest::new(
            locator,
            &self.output_dir,
            self.config.segment_secs,
            &self.channel_id,
        )
        .with_segment_start(segment_start)
        .with_headers(self.config.headers.iter().cloned());

        let mut handle = self.backend.run_capture(request).await?;
        if self
            .slot
            .set_state_if_current(&self.session_id, RecordingState::Recording)
        {
            self.metrics
                .set_channel_state(&self.channel_id, RecordingState::Recording);
        }

        let counter_token = self.stop_token.child_token();
        let counter = tokio::spawn(count_segments(
            self.output_dir.clone(),
            self.manifest.clone(),
            prefix,
            suffix,
            self.config.segment_poll_interval,
            counter_token.clone(),
        ));

        let code = tokio::select! {
            code = handle.wait() => code,
            _ = self.kill_token.cancelled() => {
                handle.terminate();
                handle.wait().await
            }
        };

        counter_token.cancel();
        let _ = counter.await;
        Ok(code)
    }

    /// End the session after its retries are exhausted, unless a newer
    /// session already owns the slot.
    async fn abandon(&self) {
        let mut guard = self.slot.session.lock().await;
        let Some(session) = guard.take_if(|s| s.id == self.session_id) else {
            return;
        };

        self.slot.set_status(RecordingState::Stopping, None);
        session.close(&self.channel_id).await;
        self.slot.set_status(RecordingState::Idle, None);
        self.metrics
            .set_channel_state(&self.channel_id, RecordingState::Idle);
        self.metrics.record_recording_stopped();
        info!(channel_id = %self.channel_id, "Session abandoned");
    }
}

/// Periodically rescan `dir` and persist the segment count. Filesystem
/// errors are ignored.
async fn count_segments(
    dir: PathBuf,
    manifest: Arc<ManifestWriter>,
    prefix: &'static str,
    suffix: &'static str,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match count_files_matching(&dir, prefix, suffix).await {
            Ok(count) => {
                if let Err(e) = manifest.set_segment_count(count).await {
                    debug!(dir = %dir.display(), "Failed to persist segment count: {}", e);
                }
            }
            Err(e) => debug!(dir = %dir.display(), "Failed to count segments: {}", e),
        }
    }
}
