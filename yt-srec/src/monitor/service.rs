//! Live poller: the detection loop driving the recorder.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::detector::{LiveDetector, Transition};
use super::resolver::LiveStatusResolver;
use crate::Result;
use crate::metrics::MetricsCollector;
use crate::recorder::SessionControl;

/// Configuration for the poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Channels to watch, processed in this order.
    pub channels: Vec<String>,
    /// Sleep between the end of one iteration and the start of the next.
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            interval: Duration::from_secs(30),
        }
    }
}

/// Polls every configured channel, feeds the detector and starts or stops
/// recordings on transitions.
pub struct LivePoller {
    config: PollerConfig,
    resolver: Arc<dyn LiveStatusResolver>,
    control: Arc<dyn SessionControl>,
    detector: LiveDetector,
    metrics: Arc<MetricsCollector>,
}

impl LivePoller {
    pub fn new(
        config: PollerConfig,
        resolver: Arc<dyn LiveStatusResolver>,
        control: Arc<dyn SessionControl>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            resolver,
            control,
            detector: LiveDetector::new(),
            metrics,
        }
    }

    pub fn detector(&self) -> &LiveDetector {
        &self.detector
    }

    /// Run until `cancel` fires.
    ///
    /// The interval is slept after each iteration, so iteration time adds to
    /// the period.
    pub async fn run(&self, cancel: CancellationToken) {
        self.metrics
            .set_channels_total(self.config.channels.len() as u64);
        info!(
            channels = self.config.channels.len(),
            interval = ?self.config.interval,
            "Live poller started"
        );

        loop {
            self.poll_once(&cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Live poller stopped");
    }

    /// One pass over all channels, sequentially. Returns the number of
    /// channels that failed.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> usize {
        let started = Instant::now();
        let mut errors = 0;

        for channel_id in &self.config.channels {
            if cancel.is_cancelled() {
                debug!("Poll iteration interrupted");
                return errors;
            }

            if let Err(e) = self.check_channel(channel_id).await {
                errors += 1;
                self.metrics.record_poll_error(channel_id);
                warn!(channel_id = %channel_id, "Poll failed: {}", e);
            }

            let state = self.control.get_state(channel_id);
            self.metrics.set_channel_state(channel_id, state);
        }

        let elapsed = started.elapsed();
        self.metrics.record_poll_completed(elapsed, Utc::now());
        debug!(elapsed = ?elapsed, errors, "Poll iteration finished");
        errors
    }

    /// Resolve one channel and act on its transition.
    pub async fn check_channel(&self, channel_id: &str) -> Result<Transition> {
        let observed = self.resolver.resolve_live_stream(channel_id).await?;
        let transition = self.detector.update(channel_id, observed.as_deref());

        if transition.changed {
            match observed.as_deref() {
                Some(stream_id) => {
                    info!(channel_id = %channel_id, stream_id = %stream_id, "Channel went live");
                    self.control.start(channel_id, stream_id).await?;
                }
                None => {
                    info!(channel_id = %channel_id, "Channel went offline");
                    self.control.stop(channel_id).await?;
                }
            }
        }

        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::Error;
    use crate::domain::RecordingState;

    /// Resolver answering from a per-channel script; `Err` entries are
    /// transient failures.
    #[derive(Default)]
    struct Scripted {
        answers: Mutex<HashMap<String, VecDeque<std::result::Result<Option<String>, ()>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn push(&self, channel: &str, answer: std::result::Result<Option<&str>, ()>) {
            self.answers
                .lock()
                .entry(channel.to_string())
                .or_default()
                .push_back(answer.map(|o| o.map(String::from)));
        }
    }

    #[async_trait]
    impl LiveStatusResolver for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn resolve_live_stream(&self, channel_id: &str) -> Result<Option<String>> {
            self.calls.lock().push(channel_id.to_string());
            match self
                .answers
                .lock()
                .get_mut(channel_id)
                .and_then(|q| q.pop_front())
            {
                Some(Ok(answer)) => Ok(answer),
                Some(Err(())) => Err(Error::transient("scripted failure")),
                None => Ok(None),
            }
        }
    }

    #[derive(Default)]
    struct Control {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionControl for Control {
        async fn start(&self, channel_id: &str, stream_id: &str) -> Result<()> {
            self.calls
                .lock()
                .push(format!("start {} {}", channel_id, stream_id));
            Ok(())
        }

        async fn stop(&self, channel_id: &str) -> Result<()> {
            self.calls.lock().push(format!("stop {}", channel_id));
            Ok(())
        }

        fn get_state(&self, _channel_id: &str) -> RecordingState {
            RecordingState::Idle
        }
    }

    fn poller(
        channels: &[&str],
        resolver: Arc<Scripted>,
        control: Arc<Control>,
        metrics: Arc<MetricsCollector>,
    ) -> LivePoller {
        LivePoller::new(
            PollerConfig {
                channels: channels.iter().map(|c| c.to_string()).collect(),
                interval: Duration::from_secs(30),
            },
            resolver,
            control,
            metrics,
        )
    }

    #[tokio::test]
    async fn test_channels_polled_in_order() {
        let resolver = Arc::new(Scripted::default());
        let control = Arc::new(Control::default());
        let poller = poller(
            &["UC3", "UC1", "UC2"],
            resolver.clone(),
            control,
            Arc::new(MetricsCollector::new()),
        );

        poller.poll_once(&CancellationToken::new()).await;
        assert_eq!(*resolver.calls.lock(), vec!["UC3", "UC1", "UC2"]);
    }

    #[tokio::test]
    async fn test_channel_error_is_isolated() {
        let resolver = Arc::new(Scripted::default());
        resolver.push("UC1", Err(()));
        resolver.push("UC2", Ok(Some("V2")));
        let control = Arc::new(Control::default());
        let metrics = Arc::new(MetricsCollector::new());
        let poller = poller(&["UC1", "UC2"], resolver, control.clone(), metrics.clone());

        let errors = poller.poll_once(&CancellationToken::new()).await;

        assert_eq!(errors, 1);
        assert_eq!(*control.calls.lock(), vec!["start UC2 V2"]);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.poll_errors.get("UC1"), Some(&1));
        assert_eq!(snapshot.poll_count, 1);
        assert!(snapshot.last_poll_success.is_some());
        assert_eq!(snapshot.channel_state.get("UC1"), Some(&0));
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_previous_observation() {
        let resolver = Arc::new(Scripted::default());
        resolver.push("UC1", Ok(Some("V1")));
        resolver.push("UC1", Err(()));
        resolver.push("UC1", Ok(Some("V1")));
        let control = Arc::new(Control::default());
        let poller = poller(&["UC1"], resolver, control.clone(), Arc::new(MetricsCollector::new()));

        let cancel = CancellationToken::new();
        for _ in 0..3 {
            poller.poll_once(&cancel).await;
        }

        assert_eq!(*control.calls.lock(), vec!["start UC1 V1"]);
        assert_eq!(poller.detector().last_seen("UC1").as_deref(), Some("V1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sleeps_interval_and_stops_on_cancel() {
        let resolver = Arc::new(Scripted::default());
        let control = Arc::new(Control::default());
        let metrics = Arc::new(MetricsCollector::new());
        let poller = Arc::new(poller(&["UC1"], resolver.clone(), control, metrics.clone()));

        let cancel = CancellationToken::new();
        let task = {
            let poller = poller.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(cancel).await })
        };

        // iterations at t=0, 30, 60
        tokio::time::sleep(Duration::from_secs(65)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(resolver.calls.lock().len(), 3);
        assert_eq!(metrics.snapshot().channels_total, 1);
    }
}
