//! Prometheus metrics exporter.
//!
//! Exports metrics in Prometheus text format.

use std::collections::HashMap;
use std::sync::Arc;

use super::collector::MetricsCollector;

/// Prometheus metrics exporter.
pub struct PrometheusExporter {
    collector: Arc<MetricsCollector>,
    namespace: String,
}

impl PrometheusExporter {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self::with_namespace(collector, "yt_srec")
    }

    pub fn with_namespace(collector: Arc<MetricsCollector>, namespace: impl Into<String>) -> Self {
        Self {
            collector,
            namespace: namespace.into(),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let snapshot = self.collector.snapshot();
        let mut output = String::new();

        // Recording metrics
        self.write_counter(
            &mut output,
            "recordings_started_total",
            "Number of recordings started",
            snapshot.recordings_started as f64,
        );
        self.write_counter(
            &mut output,
            "recordings_stopped_total",
            "Number of recordings stopped",
            snapshot.recordings_stopped as f64,
        );
        self.write_gauge(
            &mut output,
            "active_recordings",
            "Number of channels currently recording",
            snapshot.active_recordings as f64,
        );
        self.write_labeled(
            &mut output,
            "counter",
            "recording_restarts_total",
            "Number of capture backend restarts",
            "channel",
            &snapshot.recording_restarts,
        );
        self.write_labeled(
            &mut output,
            "counter",
            "retries_exhausted_total",
            "Number of sessions abandoned after exhausting retries",
            "channel",
            &snapshot.retries_exhausted,
        );

        // Poll metrics
        self.write_counter(
            &mut output,
            "poll_errors_total",
            "Number of poll errors",
            snapshot.poll_errors_total() as f64,
        );
        self.write_summary(
            &mut output,
            "poll_duration_seconds",
            "Time spent in polling cycles",
            snapshot.poll_duration_total_ms as f64 / 1000.0,
            snapshot.poll_count,
        );
        self.write_gauge(
            &mut output,
            "last_poll_timestamp",
            "Unix timestamp of last successful poll",
            snapshot
                .last_poll_success
                .map(|t| t.timestamp() as f64)
                .unwrap_or(0.0),
        );

        // Channel metrics
        self.write_gauge(
            &mut output,
            "channels_total",
            "Total number of channels monitored",
            snapshot.channels_total as f64,
        );
        self.write_labeled(
            &mut output,
            "gauge",
            "channel_state",
            "State of channel (0=idle,1=recording,2=stopping,3=error)",
            "channel",
            &snapshot.channel_state,
        );

        output
    }

    fn write_gauge(&self, output: &mut String, name: &str, help: &str, value: f64) {
        self.write_metric(output, "gauge", name, help, value);
    }

    fn write_counter(&self, output: &mut String, name: &str, help: &str, value: f64) {
        self.write_metric(output, "counter", name, help, value);
    }

    fn write_metric(&self, output: &mut String, kind: &str, name: &str, help: &str, value: f64) {
        let full_name = format!("{}_{}", self.namespace, name);
        output.push_str(&format!("# HELP {} {}\n", full_name, help));
        output.push_str(&format!("# TYPE {} {}\n", full_name, kind));
        output.push_str(&format!("{} {}\n", full_name, value));
    }

    /// Write a quantile-less summary: one family with `_sum` and `_count`.
    fn write_summary(&self, output: &mut String, name: &str, help: &str, sum: f64, count: u64) {
        let full_name = format!("{}_{}", self.namespace, name);
        output.push_str(&format!("# HELP {} {}\n", full_name, help));
        output.push_str(&format!("# TYPE {} summary\n", full_name));
        output.push_str(&format!("{}_sum {}\n", full_name, sum));
        output.push_str(&format!("{}_count {}\n", full_name, count));
    }

    /// Write one sample per entry of `values`, sorted by label for stable output.
    fn write_labeled(
        &self,
        output: &mut String,
        kind: &str,
        name: &str,
        help: &str,
        label: &str,
        values: &HashMap<String, u64>,
    ) {
        let full_name = format!("{}_{}", self.namespace, name);
        output.push_str(&format!("# HELP {} {}\n", full_name, help));
        output.push_str(&format!("# TYPE {} {}\n", full_name, kind));

        let mut entries: Vec<_> = values.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in entries {
            output.push_str(&format!(
                "{}{{{}=\"{}\"}} {}\n",
                full_name,
                label,
                escape_label(key),
                value
            ));
        }
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
