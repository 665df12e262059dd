//! Metrics collector implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::domain::RecordingState;

/// Metrics collector for polling and recording.
#[derive(Debug)]
pub struct MetricsCollector {
    // Recording metrics
    recordings_started: AtomicU64,
    recordings_stopped: AtomicU64,
    recording_restarts: DashMap<String, AtomicU64>,
    retries_exhausted: DashMap<String, AtomicU64>,

    // Poll metrics
    poll_errors: DashMap<String, AtomicU64>,
    poll_duration_total_ms: AtomicU64,
    poll_duration_last_ms: AtomicU64,
    poll_count: AtomicU64,
    /// Unix timestamp (seconds) of the last completed poll, 0 if none.
    last_poll_success: AtomicI64,

    // Channel metrics
    channels_total: AtomicU64,
    channel_state: DashMap<String, AtomicU64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            recordings_started: AtomicU64::new(0),
            recordings_stopped: AtomicU64::new(0),
            recording_restarts: DashMap::new(),
            retries_exhausted: DashMap::new(),
            poll_errors: DashMap::new(),
            poll_duration_total_ms: AtomicU64::new(0),
            poll_duration_last_ms: AtomicU64::new(0),
            poll_count: AtomicU64::new(0),
            last_poll_success: AtomicI64::new(0),
            channels_total: AtomicU64::new(0),
            channel_state: DashMap::new(),
        }
    }

    fn bump(map: &DashMap<String, AtomicU64>, key: &str) {
        if let Some(counter) = map.get(key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        map.entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn collect(map: &DashMap<String, AtomicU64>) -> HashMap<String, u64> {
        map.iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }

    // ========== Recording Metrics ==========

    pub fn record_recording_started(&self) {
        self.recordings_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recording_stopped(&self) {
        self.recordings_stopped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a backend restart after an unplanned exit.
    pub fn record_restart(&self, channel_id: &str) {
        Self::bump(&self.recording_restarts, channel_id);
    }

    /// Record a session abandoned after exhausting its retries.
    pub fn record_retries_exhausted(&self, channel_id: &str) {
        Self::bump(&self.retries_exhausted, channel_id);
    }

    pub fn recordings_started(&self) -> u64 {
        self.recordings_started.load(Ordering::Relaxed)
    }

    pub fn recordings_stopped(&self) -> u64 {
        self.recordings_stopped.load(Ordering::Relaxed)
    }

    // ========== Poll Metrics ==========

    pub fn record_poll_error(&self, channel_id: &str) {
        Self::bump(&self.poll_errors, channel_id);
    }

    /// Record a finished poll iteration.
    pub fn record_poll_completed(&self, duration: Duration, at: DateTime<Utc>) {
        let ms = duration.as_millis() as u64;
        self.poll_duration_total_ms.fetch_add(ms, Ordering::Relaxed);
        self.poll_duration_last_ms.store(ms, Ordering::Relaxed);
        self.poll_count.fetch_add(1, Ordering::Relaxed);
        self.last_poll_success
            .store(at.timestamp(), Ordering::Relaxed);
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count.load(Ordering::Relaxed)
    }

    pub fn last_poll_success(&self) -> Option<DateTime<Utc>> {
        match self.last_poll_success.load(Ordering::Relaxed) {
            0 => None,
            ts => DateTime::from_timestamp(ts, 0),
        }
    }

    // ========== Channel Metrics ==========

    pub fn set_channels_total(&self, count: u64) {
        self.channels_total.store(count, Ordering::Relaxed);
    }

    pub fn set_channel_state(&self, channel_id: &str, state: RecordingState) {
        let code = u64::from(state.code());
        if let Some(gauge) = self.channel_state.get(channel_id) {
            gauge.store(code, Ordering::Relaxed);
            return;
        }
        self.channel_state
            .entry(channel_id.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .store(code, Ordering::Relaxed);
    }

    pub fn channel_state(&self, channel_id: &str) -> Option<u64> {
        self.channel_state
            .get(channel_id)
            .map(|v| v.load(Ordering::Relaxed))
    }

    /// Channels whose last published state is `recording`.
    pub fn active_recordings(&self) -> u64 {
        let recording = u64::from(RecordingState::Recording.code());
        self.channel_state
            .iter()
            .filter(|e| e.value().load(Ordering::Relaxed) == recording)
            .count() as u64
    }

    /// Take a point-in-time snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let poll_count = self.poll_count.load(Ordering::Relaxed);
        let poll_total_ms = self.poll_duration_total_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            recordings_started: self.recordings_started(),
            recordings_stopped: self.recordings_stopped(),
            active_recordings: self.active_recordings(),
            recording_restarts: Self::collect(&self.recording_restarts),
            retries_exhausted: Self::collect(&self.retries_exhausted),
            poll_errors: Self::collect(&self.poll_errors),
            poll_count,
            poll_duration_total_ms: poll_total_ms,
            poll_duration_last_ms: self.poll_duration_last_ms.load(Ordering::Relaxed),
            poll_duration_avg_ms: if poll_count > 0 {
                poll_total_ms as f64 / poll_count as f64
            } else {
                0.0
            },
            last_poll_success: self.last_poll_success(),
            channels_total: self.channels_total.load(Ordering::Relaxed),
            channel_state: Self::collect(&self.channel_state),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub recordings_started: u64,
    pub recordings_stopped: u64,
    pub active_recordings: u64,
    pub recording_restarts: HashMap<String, u64>,
    pub retries_exhausted: HashMap<String, u64>,

    pub poll_errors: HashMap<String, u64>,
    pub poll_count: u64,
    pub poll_duration_total_ms: u64,
    pub poll_duration_last_ms: u64,
    pub poll_duration_avg_ms: f64,
    pub last_poll_success: Option<DateTime<Utc>>,

    pub channels_total: u64,
    pub channel_state: HashMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn poll_errors_total(&self) -> u64 {
        self.poll_errors.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_metrics() {
        let collector = MetricsCollector::new();
        collector.record_recording_started();
        collector.record_recording_started();
        collector.record_recording_stopped();
        collector.record_restart("UC1");
        collector.record_restart("UC1");
        collector.record_retries_exhausted("UC2");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recordings_started, 2);
        assert_eq!(snapshot.recordings_stopped, 1);
        assert_eq!(snapshot.recording_restarts.get("UC1"), Some(&2));
        assert_eq!(snapshot.retries_exhausted.get("UC2"), Some(&1));
    }

    #[test]
    fn test_poll_metrics() {
        let collector = MetricsCollector::new();
        assert!(collector.last_poll_success().is_none());

        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        collector.record_poll_completed(Duration::from_millis(100), at);
        collector.record_poll_completed(Duration::from_millis(300), at);
        collector.record_poll_error("UC1");
        collector.record_poll_error("UC2");
        collector.record_poll_error("UC1");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.poll_count, 2);
        assert_eq!(snapshot.poll_duration_last_ms, 300);
        assert_eq!(snapshot.poll_duration_avg_ms, 200.0);
        assert_eq!(snapshot.last_poll_success, Some(at));
        assert_eq!(snapshot.poll_errors.get("UC1"), Some(&2));
        assert_eq!(snapshot.poll_errors_total(), 3);
    }

    #[test]
    fn test_channel_state_codes() {
        let collector = MetricsCollector::new();
        collector.set_channels_total(3);
        collector.set_channel_state("UC1", RecordingState::Recording);
        collector.set_channel_state("UC2", RecordingState::Error);
        collector.set_channel_state("UC3", RecordingState::Idle);
        collector.set_channel_state("UC2", RecordingState::Recording);

        assert_eq!(collector.channel_state("UC1"), Some(1));
        assert_eq!(collector.channel_state("UC2"), Some(1));
        assert_eq!(collector.channel_state("UC3"), Some(0));
        assert_eq!(collector.channel_state("UC4"), None);
        assert_eq!(collector.active_recordings(), 2);
        assert_eq!(collector.snapshot().channels_total, 3);
    }
}
