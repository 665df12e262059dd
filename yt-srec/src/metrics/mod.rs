//! In-process metrics for the recorder.
//!
//! The poller and recorder record counters into a shared
//! [`MetricsCollector`]; [`PrometheusExporter`] renders them in the
//! Prometheus text format for whatever exposition layer sits on top.

mod collector;
mod prometheus;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use prometheus::PrometheusExporter;
